use plugin_fs::NormalizedPath;
use proptest::prelude::*;

proptest! {
    #[test]
    fn normalization_invariants(s in "\\PC*") {
        let path = NormalizedPath::new(&s);
        let as_str = path.as_str();

        prop_assert!(!as_str.contains('\\'));

        // Only a leading network prefix may contain a double slash
        let body = if as_str.starts_with("//") { &as_str[2..] } else { as_str };
        prop_assert!(!body.contains("//"));

        let roundtripped = NormalizedPath::new(path.to_native());
        prop_assert_eq!(&path, &roundtripped);
    }

    #[test]
    fn normalization_is_idempotent(s in "[a-z./]{0,24}") {
        let once = NormalizedPath::new(&s);
        let twice = NormalizedPath::new(once.as_str());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn join_stays_inside_for_plain_segments(seg in "[a-z0-9_]{1,12}") {
        let root = NormalizedPath::new("/plugins");
        let joined = root.join(&seg);
        prop_assert!(joined.is_inside(&root));
        prop_assert_eq!(joined.file_name(), Some(seg.as_str()));
    }
}
