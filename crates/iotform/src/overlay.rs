//! Rebuilding full configuration sets for partial (PATCH style) update APIs.
//!
//! Some update calls only touch the named sub-configurations they are given
//! and leave every other one as it was. Sending only the desired entries
//! would silently keep stale entries enabled, so the payload is rebuilt from
//! the observed configuration with everything switched off, overlaid by what
//! is desired.
use std::collections::BTreeMap;

/// Every observed entry passed through `disable`, then every desired entry
/// on top.
pub fn overlay_disabled<K, V>(
    observed: &BTreeMap<K, V>,
    desired: &BTreeMap<K, V>,
    disable: impl Fn(&V) -> V,
) -> BTreeMap<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    let mut merged = observed
        .iter()
        .map(|(key, value)| (key.clone(), disable(value)))
        .collect::<BTreeMap<_, _>>();
    merged.extend(desired.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

#[cfg(test)]
mod test {
    use super::*;

    fn checks(entries: &[(&str, bool)]) -> BTreeMap<String, bool> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn unmentioned_checks_are_switched_off() {
        let observed = checks(&[("A", true), ("B", true)]);
        let desired = checks(&[("A", false)]);
        let payload = overlay_disabled(&observed, &desired, |_| false);
        assert_eq!(checks(&[("A", false), ("B", false)]), payload);
    }

    #[test]
    fn desired_entries_win_and_new_ones_are_added() {
        let observed = checks(&[("A", false), ("B", true)]);
        let desired = checks(&[("A", true), ("C", true)]);
        let payload = overlay_disabled(&observed, &desired, |_| false);
        assert_eq!(checks(&[("A", true), ("B", false), ("C", true)]), payload);
    }

    #[test]
    fn nothing_observed_is_just_desired() {
        let desired = checks(&[("A", true)]);
        assert_eq!(desired, overlay_disabled(&BTreeMap::new(), &desired, |_| false));
    }
}
