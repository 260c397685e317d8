//! Demonstrates backing a `HashArr` with a real memory-mapped file,
//! rather than a `Vec<u8>`. This lives outside the library's public API
//! (`hasharr` never links `memmap2`) because the mechanism a region comes
//! from is out of scope for the core; a single process creates the table
//! and then reattaches to its own mapping, the way a second process
//! opening the same file later would.

use std::fs::OpenOptions;
use std::path::PathBuf;

use hasharr::HashArr;
use memmap2::MmapMut;

const KEYMAX: usize = 32;
const VALMAX: usize = 64;
const CAPACITY: u32 = 64;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let path: PathBuf = std::env::temp_dir().join("hasharr_shm_demo.bin");
    let size = HashArr::<KEYMAX, VALMAX>::required_size(CAPACITY);

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)?;
    file.set_len(size as u64)?;

    let mut mmap = unsafe { MmapMut::map_mut(&file)? };

    {
        let mut table = HashArr::<KEYMAX, VALMAX>::create(&mut mmap[..])?;
        table.put(b"language", b"rust")?;
        table.put(b"structure", b"hash table")?;
        println!("created table at {}, size={:?}", path.display(), table.size());
    }

    // Reattach as if this were a fresh process opening the same file.
    let table = HashArr::<KEYMAX, VALMAX>::attach(&mut mmap[..])?;
    println!(
        "reattached: language = {:?}",
        String::from_utf8_lossy(&table.get(b"language")?)
    );

    std::fs::remove_file(&path).ok();
    Ok(())
}
