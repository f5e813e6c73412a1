//! `ClusterChain`: a byte-addressable view over a chain of clusters, across
//! multi-cluster, variable-sector-size chains.

use crate::device::BlockDevice;
use crate::error::Result;
use crate::fat::Fat;

#[derive(Debug, Clone, Copy)]
pub struct ChainGeometry {
    pub files_offset: u64,
    pub bytes_per_cluster: u32,
}

impl ChainGeometry {
    fn cluster_offset(&self, cluster: u32) -> u64 {
        self.files_offset + (cluster as u64 - 2) * self.bytes_per_cluster as u64
    }
}

#[derive(Debug)]
pub struct ClusterChain {
    geometry: ChainGeometry,
    start_cluster: u32,
    read_only: bool,
}

impl ClusterChain {
    pub fn new(geometry: ChainGeometry, start_cluster: u32, read_only: bool) -> Self {
        Self { geometry, start_cluster, read_only }
    }

    pub fn start_cluster(&self) -> u32 {
        self.start_cluster
    }

    pub fn set_start_cluster(&mut self, cluster: u32) {
        self.start_cluster = cluster;
    }

    pub fn length(&self, fat: &Fat) -> Result<u64> {
        let clusters = fat.get_chain_length(self.start_cluster)?;
        Ok(clusters as u64 * self.geometry.bytes_per_cluster as u64)
    }

    /// Grows by appending newly-allocated, zero-filled clusters, or shrinks
    /// by truncating the chain and freeing the suffix.
    pub fn set_chain_length(&mut self, device: &mut dyn BlockDevice, fat: &mut Fat, new_len_bytes: u64) -> Result<()> {
        let bpc = self.geometry.bytes_per_cluster as u64;
        let wanted_clusters = ((new_len_bytes + bpc - 1) / bpc) as u32;
        let wanted_clusters = if new_len_bytes == 0 { 0 } else { wanted_clusters.max(1) };

        let current_len = fat.get_chain_length(self.start_cluster)?;

        if wanted_clusters == current_len {
            return Ok(());
        }

        if wanted_clusters < current_len {
            if wanted_clusters == 0 {
                fat.free_chain(self.start_cluster)?;
                self.start_cluster = 0;
            } else {
                fat.truncate_chain(self.start_cluster, wanted_clusters)?;
            }
            return Ok(());
        }

        // Growing: allocate `wanted_clusters - current_len` more clusters,
        // zero-filling each as it's attached.
        let zeros = vec![0u8; self.geometry.bytes_per_cluster as usize];
        let mut to_add = wanted_clusters - current_len;

        if self.start_cluster == 0 {
            let first = fat.alloc_new()?;
            self.start_cluster = first;
            device.write(self.geometry.cluster_offset(first), &zeros)?;
            to_add -= 1;
        }

        let mut tail = fat.get_last_cluster(self.start_cluster)?.unwrap();
        for _ in 0..to_add {
            let new_cluster = fat.alloc_append(tail)?;
            device.write(self.geometry.cluster_offset(new_cluster), &zeros)?;
            tail = new_cluster;
        }

        Ok(())
    }

    /// Reads `buf.len()` bytes starting at logical `offset`, walking the
    /// chain as needed. Returns the number of bytes actually read: short on
    /// reaching the end of the chain, with no zero-padding of the
    /// remainder.
    pub fn read(&self, device: &mut dyn BlockDevice, fat: &Fat, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if self.start_cluster == 0 {
            return Ok(0);
        }

        let bpc = self.geometry.bytes_per_cluster as u64;
        let chain = fat.get_chain(self.start_cluster)?;
        let total_len = chain.len() as u64 * bpc;

        if offset >= total_len {
            return Ok(0);
        }

        let to_read = buf.len().min((total_len - offset) as usize);
        let mut done = 0usize;

        while done < to_read {
            let pos = offset + done as u64;
            let cluster_idx = (pos / bpc) as usize;
            let cluster = chain[cluster_idx];
            let in_cluster_offset = pos % bpc;
            let chunk = ((bpc - in_cluster_offset) as usize).min(to_read - done);

            device.read(self.geometry.cluster_offset(cluster) + in_cluster_offset, &mut buf[done..done + chunk])?;
            done += chunk;
        }

        Ok(done)
    }

    /// Writes `buf`, growing the chain implicitly if `offset + buf.len()`
    /// exceeds the current length. Never shrinks.
    pub fn write(&mut self, device: &mut dyn BlockDevice, fat: &mut Fat, offset: u64, buf: &[u8]) -> Result<()> {
        let bpc = self.geometry.bytes_per_cluster as u64;
        let needed_len = offset + buf.len() as u64;

        let current_len = self.length(fat)?;
        if needed_len > current_len {
            self.set_chain_length(device, fat, needed_len)?;
        }

        let chain = fat.get_chain(self.start_cluster)?;
        let mut done = 0usize;

        while done < buf.len() {
            let pos = offset + done as u64;
            let cluster_idx = (pos / bpc) as usize;
            let cluster = chain[cluster_idx];
            let in_cluster_offset = pos % bpc;
            let chunk = ((bpc - in_cluster_offset) as usize).min(buf.len() - done);

            device.write(self.geometry.cluster_offset(cluster) + in_cluster_offset, &buf[done..done + chunk])?;
            done += chunk;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot_sector::FatType;
    use crate::device::MemoryBlockDevice;
    use assert_eq as eq;

    fn setup() -> (MemoryBlockDevice, Fat, ChainGeometry) {
        let dev = MemoryBlockDevice::new(1 << 20, 512);
        let fat = Fat::from_entries(FatType::Fat16, vec![0; 130]);
        let geometry = ChainGeometry { files_offset: 4096, bytes_per_cluster: 2048 };
        (dev, fat, geometry)
    }

    #[test]
    fn write_then_read_round_trips() {
        let (mut dev, mut fat, geometry) = setup();
        let mut chain = ClusterChain::new(geometry, 0, false);

        chain.write(&mut dev, &mut fat, 0, b"hello world").unwrap();

        let mut buf = [0u8; 11];
        let n = chain.read(&mut dev, &fat, 0, &mut buf).unwrap();
        eq!(n, 11);
        eq!(&buf, b"hello world");
    }

    #[test]
    fn write_spanning_multiple_clusters_grows_chain() {
        let (mut dev, mut fat, geometry) = setup();
        let mut chain = ClusterChain::new(geometry, 0, false);

        let data = vec![0xAAu8; 3000]; // > one 2048-byte cluster
        chain.write(&mut dev, &mut fat, 0, &data).unwrap();

        eq!(chain.length(&fat).unwrap(), 4096); // rounded up to 2 clusters
        let mut buf = vec![0u8; 3000];
        let n = chain.read(&mut dev, &fat, 0, &mut buf).unwrap();
        eq!(n, 3000);
        eq!(buf, data);
    }

    #[test]
    fn read_past_end_is_a_short_read_not_zero_padded() {
        let (mut dev, mut fat, geometry) = setup();
        let mut chain = ClusterChain::new(geometry, 0, false);
        chain.write(&mut dev, &mut fat, 0, b"abc").unwrap();

        let mut buf = [0xFFu8; 10];
        let n = chain.read(&mut dev, &fat, 0, &mut buf).unwrap();
        eq!(n, 3);
        eq!(&buf[..3], b"abc");
        eq!(&buf[3..], &[0xFFu8; 7][..]); // untouched, not zeroed
    }

    #[test]
    fn shrink_frees_the_dropped_clusters() {
        let (mut dev, mut fat, geometry) = setup();
        let mut chain = ClusterChain::new(geometry, 0, false);
        chain.write(&mut dev, &mut fat, 0, &vec![0u8; 5000]).unwrap();
        let before_free = fat.free_cluster_count();

        chain.set_chain_length(&mut dev, &mut fat, 2048).unwrap();
        eq!(chain.length(&fat).unwrap(), 2048);
        assert!(fat.free_cluster_count() > before_free);
    }
}
