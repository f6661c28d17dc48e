use super::types::{Bytes, Seconds};

///Size of a child pointer stored next to every key in an inner node
pub const POINTER_SIZE: Bytes = std::mem::size_of::<usize>();

///Size of one invalidation flag / bitmap update
pub const FLAG_SIZE: Bytes = 1;

pub const BITS_PER_BYTE: usize = 8;

//default PCM model, from "Rethinking Database Algorithms for PCM"
pub const DEFAULT_MEM_LINE: Bytes = 64;
pub const DEFAULT_READ_TIME: Seconds = 50.0 / 1_000_000_000.0;
pub const DEFAULT_WRITE_TIME: Seconds = 1.0 / 1_000_000.0;
