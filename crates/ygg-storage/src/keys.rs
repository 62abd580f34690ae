use ygg_types::RegionId;

/// `raft_log` partition: `region(8) ++ index(8)`, fixed 16 bytes.
/// Big-endian on both components so lexicographic order is numeric order.
pub fn raft_log_key(region_id: RegionId, index: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&region_id.to_be_bytes());
    key[8..].copy_from_slice(&index.to_be_bytes());
    key
}

/// Log index stored in the last 8 bytes of a `raft_log` key.
pub fn raft_log_index(key: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = key.get(8..16)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// 8-byte prefix shared by every key a region owns in `raft_log` and `raft_meta`.
pub fn region_prefix(region_id: RegionId) -> [u8; 8] {
    region_id.to_be_bytes()
}

/// Exclusive upper bound of a region's prefixed keys. Empty for the last
/// possible region id, which callers treat as unbounded.
pub fn region_end(region_id: RegionId) -> Vec<u8> {
    match region_id.checked_add(1) {
        Some(next) => next.to_be_bytes().to_vec(),
        None => Vec::new(),
    }
}

/// `raft_meta` partition: `region(8) ++ label_utf8`
pub fn raft_meta_key(region_id: RegionId, label: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + label.len());
    buf.extend_from_slice(&region_id.to_be_bytes());
    buf.extend_from_slice(label.as_bytes());
    buf
}

/// Smallest key greater than every key starting with `prefix`: the prefix
/// with its last non-0xff byte incremented and the tail dropped. `None` when
/// no such key exists (empty or all-0xff prefix).
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raft_log_keys_sort_by_index() {
        let a = raft_log_key(7, 1);
        let b = raft_log_key(7, 2);
        let c = raft_log_key(7, 1000);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(raft_log_index(&c), Some(1000));
    }

    #[test]
    fn regions_dont_interleave() {
        let high = raft_log_key(1, u64::MAX);
        let low = raft_log_key(2, 0);
        assert!(high < low);
        assert!(high.as_slice() < region_end(1).as_slice());
        assert!(region_end(u64::MAX).is_empty());
    }

    #[test]
    fn raft_meta_key_is_region_prefixed() {
        let key = raft_meta_key(42, "vote");
        assert!(key.starts_with(&region_prefix(42)));
        assert_eq!(&key[8..], b"vote");
    }

    #[test]
    fn prefix_end_increments() {
        assert_eq!(prefix_end(b"META_REGION_"), Some(b"META_REGION`".to_vec()));
        assert_eq!(prefix_end(&[0x01, 0xff]), Some(vec![0x02]));
        assert_eq!(prefix_end(&[0xff, 0xff]), None);
        assert_eq!(prefix_end(b""), None);
    }

    #[test]
    fn short_log_key_has_no_index() {
        assert_eq!(raft_log_index(&[0u8; 10]), None);
    }
}
