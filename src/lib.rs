//! An in-place hash table that lives entirely inside a caller-supplied
//! fixed-size contiguous byte region: a static buffer, a `Vec<u8>`, or a
//! memory-mapped file (see `demos/shm_demo.rs` for the mmap case).
//!
//! The table does no allocation of its own once opened and performs no
//! internal synchronization; callers sharing a region across threads or
//! processes are responsible for their own locking.
//!
//! ```
//! use hasharr::HashArr;
//!
//! let mut region = vec![0u8; HashArr::<32, 64>::required_size(16)];
//! let mut table = HashArr::<32, 64>::create(&mut region).unwrap();
//! table.put(b"hello", b"world").unwrap();
//! assert_eq!(table.get(b"hello").unwrap(), b"world");
//! ```

mod error;
mod hash;
mod layout;
mod table;

pub use error::{Error, Result};
pub use table::HashArr;
