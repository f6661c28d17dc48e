use std::{cell::RefCell, rc::Rc};

use crate::{
    ceil_div,
    error::{ensure_positive, Result, SimError},
    util::{
        system_info::{DEFAULT_MEM_LINE, DEFAULT_READ_TIME, DEFAULT_WRITE_TIME},
        types::{Bytes, Seconds},
    },
};

///Device shared by every engine simulated on it (single threaded, see RefCell)
pub type SharedPcm = Rc<RefCell<Pcm>>;

///Phase Change Memory model. Nothing is stored, reads and writes only turn a byte count into time
#[derive(Debug, Clone, PartialEq)]
pub struct Pcm {
    mem_line: Bytes, //minimum unit of read and write, like a page on flash
    read_time: Seconds, //per mem_line
    write_time: Seconds, //per mem_line
    wearout: Bytes, //total bytes ever written
}

impl Pcm {
    pub fn new(mem_line: Bytes, read_time: Seconds, write_time: Seconds) -> Result<Self> {
        ensure_positive("mem_line", mem_line)?;
        for (field, time) in [("read_time", read_time), ("write_time", write_time)] {
            if !(time.is_finite() && time >= 0.0) {
                return Err(SimError::invalid(field, format!("{time} is not a valid time")));
            }
        }
        Ok(Self {
            mem_line,
            read_time,
            write_time,
            wearout: 0,
        })
    }

    ///64B line, 50ns read, 1us write
    pub fn default_model() -> Self {
        Self {
            mem_line: DEFAULT_MEM_LINE,
            read_time: DEFAULT_READ_TIME,
            write_time: DEFAULT_WRITE_TIME,
            wearout: 0,
        }
    }

    pub fn into_shared(self) -> SharedPcm {
        Rc::new(RefCell::new(self))
    }

    pub fn mem_line(&self) -> Bytes {
        self.mem_line
    }
    pub fn read_time(&self) -> Seconds {
        self.read_time
    }
    pub fn write_time(&self) -> Seconds {
        self.write_time
    }
    pub fn wearout(&self) -> Bytes {
        self.wearout
    }

    ///Drivers use this to leave setup writes out of a measurement
    pub fn reset_wearout(&mut self) {
        self.wearout = 0;
    }

    fn lines(&self, bytes: Bytes) -> usize {
        ceil_div!(bytes, self.mem_line)
    }

    pub fn read(&self, bytes: Bytes) -> Seconds {
        self.lines(bytes) as Seconds * self.read_time
    }

    pub fn write(&mut self, bytes: Bytes) -> Seconds {
        self.wearout += bytes;
        self.lines(bytes) as Seconds * self.write_time
    }

    ///`count` separate writes of `bytes` each
    pub fn write_each(&mut self, bytes: Bytes, count: usize) -> Seconds {
        (0..count).map(|_| self.write(bytes)).sum()
    }
}

impl Default for Pcm {
    fn default() -> Self {
        Self::default_model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_rounds_up_to_lines() {
        let pcm = Pcm::default_model();
        assert_eq!(pcm.read(0), 0.0);
        assert_eq!(pcm.read(1), DEFAULT_READ_TIME);
        assert_eq!(pcm.read(64), DEFAULT_READ_TIME);
        assert_eq!(pcm.read(65), 2.0 * DEFAULT_READ_TIME);
        assert_eq!(pcm.wearout(), 0); //reads never wear memory
    }

    #[test]
    fn test_write_wearout() {
        let mut pcm = Pcm::default_model();
        assert_eq!(pcm.write(1), DEFAULT_WRITE_TIME);
        assert_eq!(pcm.wearout(), 1);

        assert_eq!(pcm.write(128), 2.0 * DEFAULT_WRITE_TIME);
        assert_eq!(pcm.wearout(), 129);

        pcm.reset_wearout();
        assert_eq!(pcm.wearout(), 0);
    }

    #[test]
    fn test_invalid_model() {
        assert!(Pcm::new(0, 1.0, 1.0).is_err());
        assert!(Pcm::new(64, -1.0, 1.0).is_err());
        assert!(Pcm::new(64, 1.0, f64::NAN).is_err());
        assert!(Pcm::new(64, 0.0, 0.0).is_ok());
    }

    #[test]
    fn test_shared_device() {
        let pcm = Pcm::default_model().into_shared();
        let other = Rc::clone(&pcm);
        other.borrow_mut().write(10);
        assert_eq!(pcm.borrow().wearout(), 10);
    }
}
