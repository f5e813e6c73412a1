//! `FatFile`: a cluster-chain-backed random-access file whose logical
//! length is tracked separately from the chain's cluster-aligned byte
//! length.

use crate::cluster_chain::ClusterChain;
use crate::device::BlockDevice;
use crate::error::Result;
use crate::fat::Fat;

#[derive(Debug)]
pub struct FatFile {
    chain: ClusterChain,
    size: u64,
    dirty: bool,
}

impl FatFile {
    pub fn new(chain: ClusterChain, size: u64) -> Self {
        Self { chain, size, dirty: false }
    }

    pub fn chain(&self) -> &ClusterChain {
        &self.chain
    }

    pub fn length(&self) -> u64 {
        self.size
    }

    /// Grows or shrinks the backing chain to the smallest cluster-aligned
    /// extent covering `new_len`, and updates the logical size.
    pub fn set_length(&mut self, device: &mut dyn BlockDevice, fat: &mut Fat, new_len: u64) -> Result<()> {
        self.chain.set_chain_length(device, fat, new_len)?;
        self.size = new_len;
        self.dirty = true;
        Ok(())
    }

    /// Reads bounded by the logical length, not the chain's cluster-aligned
    /// length: a read starting past `length()` is a zero-byte short read, and
    /// a read spanning past it is truncated to what `length()` allows.
    pub fn read(&self, device: &mut dyn BlockDevice, fat: &Fat, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }
        let capped = buf.len().min((self.size - offset) as usize);
        self.chain.read(device, fat, offset, &mut buf[..capped])
    }

    /// Grows the chain (and the logical size, if this write extends past the
    /// current end) as needed, then writes through.
    pub fn write(&mut self, device: &mut dyn BlockDevice, fat: &mut Fat, offset: u64, buf: &[u8]) -> Result<()> {
        self.chain.write(device, fat, offset, buf)?;
        let end = offset + buf.len() as u64;
        if end > self.size {
            self.size = end;
        }
        self.dirty = true;
        Ok(())
    }

    /// Returns whether the size/mtime have changed since the last flush,
    /// clearing the flag. The caller (`FatFileSystem::flush_file`) uses this
    /// to decide whether the owning directory entry needs updating.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot_sector::FatType;
    use crate::cluster_chain::ChainGeometry;
    use crate::device::MemoryBlockDevice;
    use assert_eq as eq;

    fn setup() -> (MemoryBlockDevice, Fat, ChainGeometry) {
        let dev = MemoryBlockDevice::new(1 << 20, 512);
        let fat = Fat::from_entries(FatType::Fat16, vec![0; 130]);
        let geometry = ChainGeometry { files_offset: 4096, bytes_per_cluster: 2048 };
        (dev, fat, geometry)
    }

    #[test]
    fn write_extends_logical_length_past_chain_rounding() {
        let (mut dev, mut fat, geometry) = setup();
        let mut file = FatFile::new(ClusterChain::new(geometry, 0, false), 0);

        file.write(&mut dev, &mut fat, 0, b"abc").unwrap();
        eq!(file.length(), 3);
        eq!(file.chain().length(&fat).unwrap(), 2048); // one whole cluster

        let mut buf = [0u8; 10];
        let n = file.read(&mut dev, &fat, 0, &mut buf).unwrap();
        eq!(n, 3); // bounded by logical length, not cluster length
        eq!(&buf[..3], b"abc");
    }

    #[test]
    fn read_past_logical_length_is_empty() {
        let (mut dev, mut fat, geometry) = setup();
        let mut file = FatFile::new(ClusterChain::new(geometry, 0, false), 0);
        file.write(&mut dev, &mut fat, 0, b"abc").unwrap();

        let mut buf = [0u8; 4];
        eq!(file.read(&mut dev, &fat, 3, &mut buf).unwrap(), 0);
    }

    #[test]
    fn set_length_shrink_frees_clusters_and_updates_size() {
        let (mut dev, mut fat, geometry) = setup();
        let mut file = FatFile::new(ClusterChain::new(geometry, 0, false), 0);
        file.write(&mut dev, &mut fat, 0, &vec![0xAAu8; 5000]).unwrap();

        file.set_length(&mut dev, &mut fat, 10).unwrap();
        eq!(file.length(), 10);
        eq!(file.chain().length(&fat).unwrap(), 2048);
    }

    #[test]
    fn take_dirty_clears_after_read() {
        let (mut dev, mut fat, geometry) = setup();
        let mut file = FatFile::new(ClusterChain::new(geometry, 0, false), 0);
        file.write(&mut dev, &mut fat, 0, b"x").unwrap();
        assert!(file.take_dirty());
        assert!(!file.take_dirty());
    }
}
