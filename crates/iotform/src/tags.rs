//! Tag sets and tag reconciliation.
//!
//! Tags are reconciled against the *live* tag listing of a resource, never
//! against a previously stored model, so tags changed out of band are
//! reconciled too. The mutation is minimal: one attach call with exactly
//! the pairs that are missing or changed, then one detach call with exactly
//! the keys that are no longer desired. Empty calls are never issued.
use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
};

use crate::Fault;

/// A set of tags. Keys are unique; order is irrelevant.
///
/// Serializes as a list of `{ "Key": .., "Value": .. }` objects, the shape
/// resource models use, and deserializes from either that list or a plain
/// `{ key: value }` object, the shape requests use.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagSet(BTreeMap<String, String>);

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TagEntry {
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum TagSetRepr {
    Map(BTreeMap<String, String>),
    List(Vec<TagEntry>),
}

impl serde::Serialize for TagSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_seq(self.0.iter().map(|(key, value)| TagEntry {
            key: key.clone(),
            value: value.clone(),
        }))
    }
}

impl<'de> serde::Deserialize<'de> for TagSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match TagSetRepr::deserialize(deserializer)? {
            TagSetRepr::Map(map) => TagSet(map),
            TagSetRepr::List(list) => list.into_iter().map(|e| (e.key, e.value)).collect(),
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        TagSet(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for TagSet {
    type Item = (String, String);

    type IntoIter = <BTreeMap<String, String> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<BTreeMap<String, String>> for TagSet {
    fn from(map: BTreeMap<String, String>) -> Self {
        TagSet(map)
    }
}

impl core::fmt::Display for TagSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(
            &self
                .0
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", "),
        )
    }
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a tag, returning the value it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Whether exactly this pair is in the set.
    pub fn contains(&self, key: &str, value: &str) -> bool {
        self.get(key) == Some(value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Adds every tag of `other`, overwriting values of keys present in both.
    pub fn merge(&mut self, other: &TagSet) {
        self.0
            .extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

/// The tag mutation that converges one tag set onto another.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagDelta {
    /// Pairs to attach. Includes keys whose value changed.
    pub to_add: TagSet,
    /// Keys to detach.
    pub to_remove: BTreeSet<String>,
}

impl TagDelta {
    /// Computes the delta that moves `current` to `desired`.
    ///
    /// A key present in both sets with a different value is only in
    /// `to_add`: attaching is an upsert, and detaching it as well would
    /// strip the tag.
    pub fn between(current: &TagSet, desired: &TagSet) -> Self {
        let to_add = desired
            .iter()
            .filter(|(k, v)| !current.contains(k, v))
            .collect();
        let to_remove = current
            .keys()
            .filter(|k| !desired.contains_key(k))
            .map(str::to_owned)
            .collect();
        TagDelta { to_add, to_remove }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// One page of a list-tags call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TagPage {
    pub tags: TagSet,
    pub next_token: Option<String>,
}

/// Tagging calls of a remote API, addressed by resource ARN.
pub trait TagService {
    fn list_tags(
        &self,
        arn: &str,
        next_token: Option<String>,
    ) -> impl Future<Output = Result<TagPage, Fault>>;

    /// Attaches tags, overwriting the values of existing keys.
    fn tag_resource(&self, arn: &str, tags: &TagSet) -> impl Future<Output = Result<(), Fault>>;

    fn untag_resource(
        &self,
        arn: &str,
        keys: &BTreeSet<String>,
    ) -> impl Future<Output = Result<(), Fault>>;
}

/// Lists every tag of a resource, following continuation tokens until the
/// last page.
pub async fn list_all<S: TagService>(service: &S, arn: &str) -> Result<TagSet, Fault> {
    let mut tags = TagSet::new();
    let mut next_token = None;
    loop {
        log::trace!("listing tags of {arn}, token {next_token:?}");
        let page = service.list_tags(arn, next_token.take()).await?;
        tags.merge(&page.tags);
        match page.next_token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }
    Ok(tags)
}

/// Applies a delta: attach first, then detach. Empty halves issue no call.
pub async fn apply<S: TagService>(service: &S, arn: &str, delta: &TagDelta) -> Result<(), Fault> {
    if !delta.to_add.is_empty() {
        log::info!("  tagging {arn} with {}", delta.to_add);
        service.tag_resource(arn, &delta.to_add).await?;
    }
    if !delta.to_remove.is_empty() {
        log::info!(
            "  untagging {arn}: {}",
            delta.to_remove.iter().cloned().collect::<Vec<_>>().join(", ")
        );
        service.untag_resource(arn, &delta.to_remove).await?;
    }
    Ok(())
}

/// Converges the live tags of `arn` onto `desired`, returning the applied delta.
pub async fn reconcile<S: TagService>(
    service: &S,
    arn: &str,
    desired: &TagSet,
) -> Result<TagDelta, Fault> {
    let current = list_all(service, arn).await?;
    let delta = TagDelta::between(&current, desired);
    log::debug!("tag delta for {arn}: {delta:?}");
    apply(service, arn, &delta).await?;
    Ok(delta)
}

/// The full desired tag set of a resource.
///
/// Request-level tags (which carry stack-level tags) come first, the tags of
/// the model override them, and system tags are added last. Missing system
/// tags are unexpected but not fatal.
pub fn desired(
    resource_tags: Option<&TagSet>,
    request_tags: Option<&TagSet>,
    system_tags: Option<&TagSet>,
) -> TagSet {
    let mut tags = TagSet::new();
    for layer in [request_tags, resource_tags].into_iter().flatten() {
        tags.merge(layer);
    }
    match system_tags {
        Some(system) => tags.merge(system),
        None => log::warn!("request carries no system tags, using resource tags only"),
    }
    tags
}

#[cfg(test)]
mod test {
    use random::Source;

    use super::*;

    fn set(pairs: &[(&str, &str)]) -> TagSet {
        pairs.iter().copied().collect()
    }

    #[test]
    fn replaced_tags() {
        let delta = TagDelta::between(
            &set(&[("PreviousTagKey", "PreviousTagValue")]),
            &set(&[("DesiredTagKey", "DesiredTagValue")]),
        );
        assert_eq!(set(&[("DesiredTagKey", "DesiredTagValue")]), delta.to_add);
        assert_eq!(
            BTreeSet::from(["PreviousTagKey".to_owned()]),
            delta.to_remove
        );
    }

    #[test]
    fn changed_value_is_only_added() {
        let delta = TagDelta::between(&set(&[("K", "old")]), &set(&[("K", "new")]));
        assert_eq!(set(&[("K", "new")]), delta.to_add);
        assert!(delta.to_remove.is_empty());
    }

    #[test]
    fn equal_sets_have_an_empty_delta() {
        let tags = set(&[("a", "1"), ("b", "2")]);
        assert!(TagDelta::between(&tags, &tags).is_empty());
        assert!(TagDelta::between(&TagSet::new(), &TagSet::new()).is_empty());
    }

    fn random_set(source: &mut random::Default) -> TagSet {
        let len = source.read_u64() % 6;
        (0..len)
            .map(|_| {
                (
                    format!("k{}", source.read_u64() % 8),
                    format!("v{}", source.read_u64() % 3),
                )
            })
            .collect()
    }

    #[test]
    fn delta_properties_hold_for_random_sets() {
        let mut source = random::default(42);
        for _ in 0..500 {
            let current = random_set(&mut source);
            let desired = random_set(&mut source);
            let delta = TagDelta::between(&current, &desired);

            for (k, v) in delta.to_add.iter() {
                assert!(desired.contains(k, v));
                assert!(!current.contains(k, v));
            }
            for k in &delta.to_remove {
                assert!(current.contains_key(k));
                assert!(!desired.contains_key(k));
                assert!(!delta.to_add.contains_key(k));
            }
            for (k, v) in current.iter() {
                if desired.contains(k, v) {
                    assert!(!delta.to_add.contains_key(k));
                    assert!(!delta.to_remove.contains(k));
                }
            }

            // applying the delta lands exactly on the desired set
            let mut applied = current.clone();
            applied.merge(&delta.to_add);
            let applied: TagSet = applied
                .into_iter()
                .filter(|(k, _)| !delta.to_remove.contains(k))
                .collect();
            assert_eq!(desired, applied);
        }
    }

    #[test]
    fn desired_layers_tags() {
        let request = set(&[("stack", "s"), ("shared", "from-stack")]);
        let resource = set(&[("shared", "from-resource"), ("own", "o")]);
        let system = set(&[("aws:cloudformation:stack-name", "my-stack")]);

        let tags = desired(Some(&resource), Some(&request), Some(&system));
        assert_eq!(
            set(&[
                ("stack", "s"),
                ("shared", "from-resource"),
                ("own", "o"),
                ("aws:cloudformation:stack-name", "my-stack"),
            ]),
            tags
        );

        let tags = desired(Some(&resource), None, None);
        assert_eq!(resource, tags);
    }

    #[test]
    fn tag_sets_read_both_shapes() {
        let from_map: TagSet = serde_json::from_str(r#"{ "a": "1", "b": "2" }"#).unwrap();
        let from_list: TagSet =
            serde_json::from_str(r#"[{ "Key": "a", "Value": "1" }, { "Key": "b", "Value": "2" }]"#)
                .unwrap();
        assert_eq!(from_map, from_list);
        assert_eq!(
            r#"[{"Key":"a","Value":"1"},{"Key":"b","Value":"2"}]"#,
            serde_json::to_string(&from_map).unwrap()
        );
    }
}
