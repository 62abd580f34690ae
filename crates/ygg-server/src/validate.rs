use std::sync::Arc;

use ygg_meta::StoreMetaManager;
use ygg_types::{Range, Region, RegionId, YggError};

pub fn validate_region(
    meta: &StoreMetaManager,
    region_id: RegionId,
) -> Result<Arc<Region>, YggError> {
    meta.get_region(region_id).ok_or(YggError::RegionNotFound(region_id))
}

pub fn validate_keys<'a, I>(region: &Region, keys: I) -> Result<(), YggError>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut any = false;
    for key in keys {
        any = true;
        if key.is_empty() {
            return Err(YggError::KeyEmpty);
        }
        if !region.range.contains(key) {
            return Err(YggError::KeyOutOfRange { region_id: region.id });
        }
    }
    if !any {
        return Err(YggError::KeyEmpty);
    }
    Ok(())
}

/// A range request must stay inside the region. An empty `end_key` reaches
/// to the region's end.
pub fn validate_range(region: &Region, range: &Range) -> Result<Range, YggError> {
    let end_key = if range.end_key.is_empty() {
        region.range.end_key.clone()
    } else {
        range.end_key.clone()
    };
    if !region.range.covers(&range.start_key, &end_key) {
        return Err(YggError::KeyOutOfRange { region_id: region.id });
    }
    Ok(Range { start_key: range.start_key.clone(), end_key })
}

pub fn validate_new_region(region: &Region) -> Result<(), YggError> {
    if region.peers.is_empty() {
        return Err(YggError::InvalidArgument(format!("region {} has no peers", region.id)));
    }
    let r = &region.range;
    if !r.end_key.is_empty() && r.start_key >= r.end_key {
        return Err(YggError::InvalidArgument(format!("region {} has an empty range", region.id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use ygg_types::{Location, Peer};

    use super::*;

    fn region(range: Range) -> Region {
        let loc = Location::new("127.0.0.1", 20001);
        Region::new(1, vec![Peer::new(1, loc.clone(), loc)], range)
    }

    #[test]
    fn keys_must_be_present_and_in_range() {
        let r = region(Range::new("b", "m"));
        assert_eq!(validate_keys(&r, [b"c".as_slice()]), Ok(()));
        assert_eq!(validate_keys(&r, [b"".as_slice()]), Err(YggError::KeyEmpty));
        assert_eq!(validate_keys(&r, std::iter::empty()), Err(YggError::KeyEmpty));
        assert_eq!(
            validate_keys(&r, [b"c".as_slice(), b"x".as_slice()]),
            Err(YggError::KeyOutOfRange { region_id: 1 })
        );
    }

    #[test]
    fn open_ended_range_clamps_to_region() {
        let r = region(Range::new("b", "m"));
        assert_eq!(validate_range(&r, &Range::new("c", "")), Ok(Range::new("c", "m")));
        assert!(validate_range(&r, &Range::new("a", "c")).is_err());
        let full = region(Range::full());
        assert_eq!(validate_range(&full, &Range::new("", "")), Ok(Range::full()));
    }

    #[test]
    fn new_region_shape() {
        assert!(validate_new_region(&region(Range::full())).is_ok());
        assert!(validate_new_region(&region(Range::new("z", "a"))).is_err());
        let mut no_peers = region(Range::full());
        no_peers.peers.clear();
        assert!(matches!(validate_new_region(&no_peers), Err(YggError::InvalidArgument(_))));
    }
}
