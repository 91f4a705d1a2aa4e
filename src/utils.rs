//! Small helpers shared by crop-mapping callers

/// Return the key of the first entry whose value equals `value`.
///
/// Entries are scanned in the mapping's iteration order, so pass an
/// insertion-ordered map (e.g. `IndexMap`) when "first" should mean first
/// inserted. Returns `None` when no value matches.
pub fn find_key<'a, K, V, I>(value: &V, mapping: I) -> Option<&'a K>
where
    K: 'a,
    V: PartialEq + 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    mapping
        .into_iter()
        .find(|(_, candidate)| *candidate == value)
        .map(|(key, _)| key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::collections::BTreeMap;

    #[test]
    fn test_first_match_in_insertion_order() {
        let mut classes = IndexMap::new();
        classes.insert("a", 1);
        classes.insert("b", 2);
        classes.insert("c", 2);

        assert_eq!(find_key(&2, &classes), Some(&"b"));
        assert_eq!(find_key(&1, &classes), Some(&"a"));
    }

    #[test]
    fn test_no_match_is_none() {
        let mut classes = IndexMap::new();
        classes.insert("crop".to_string(), 1);
        classes.insert("noncrop".to_string(), 0);

        assert_eq!(find_key(&5, &classes), None);
    }

    #[test]
    fn test_value_equality_not_identity() {
        let mut labels = BTreeMap::new();
        labels.insert(10, "maize".to_string());
        labels.insert(20, "cassava".to_string());

        let wanted = String::from("cassava");
        assert_eq!(find_key(&wanted, &labels), Some(&20));
    }
}
