//! Sibling ordering and unique-title generation.

use std::cmp::Ordering;

use super::NodeKind;

/// Splits a file title into stem and extension at the last dot.
///
/// A leading dot is part of the stem (`.gitignore` has no extension).
pub(crate) fn split_extension(title: &str) -> (&str, Option<&str>) {
    match title.rfind('.') {
        Some(dot) if dot > 0 => (&title[..dot], Some(&title[dot + 1..])),
        _ => (title, None),
    }
}

/// Case-insensitive title equality used for sibling uniqueness.
pub(crate) fn same_title(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}

fn kind_rank(kind: NodeKind) -> u8 {
    match kind {
        NodeKind::Container | NodeKind::Folder => 0,
        NodeKind::File => 1,
    }
}

/// Order of two siblings: folders first, then by title.
///
/// File titles compare stem first, so `e3.txt` sorts before `e3(1).txt`.
pub(crate) fn compare_siblings(a: (NodeKind, &str), b: (NodeKind, &str)) -> Ordering {
    kind_rank(a.0).cmp(&kind_rank(b.0)).then_with(|| {
        let by_title = if a.0 == NodeKind::File {
            let (a_stem, a_ext) = split_extension(a.1);
            let (b_stem, b_ext) = split_extension(b.1);
            a_stem
                .to_lowercase()
                .cmp(&b_stem.to_lowercase())
                .then_with(|| {
                    a_ext
                        .map(str::to_lowercase)
                        .cmp(&b_ext.map(str::to_lowercase))
                })
        } else {
            a.1.to_lowercase().cmp(&b.1.to_lowercase())
        };
        by_title.then_with(|| a.1.cmp(b.1))
    })
}

/// Title with the copy counter `n` applied.
///
/// Files get it before the extension (`e3(1).txt`), folders at the end
/// (`e1.txt(1)`).
pub(crate) fn numbered_title(title: &str, kind: NodeKind, n: usize) -> String {
    match (kind, split_extension(title)) {
        (NodeKind::File, (stem, Some(ext))) => format!("{}({}).{}", stem, n, ext),
        _ => format!("{}({})", title, n),
    }
}

/// First numbered title not rejected by `taken`.
pub(crate) fn unique_title(title: &str, kind: NodeKind, taken: impl Fn(&str) -> bool) -> String {
    (1..)
        .map(|n| numbered_title(title, kind, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("e1.txt"), ("e1", Some("txt")));
        assert_eq!(split_extension("a.b.c"), ("a.b", Some("c")));
        assert_eq!(split_extension("README"), ("README", None));
        assert_eq!(split_extension(".hidden"), (".hidden", None));
    }

    #[test]
    fn test_folders_before_files() {
        let folder = (NodeKind::Folder, "zzz");
        let file = (NodeKind::File, "aaa.txt");
        assert_eq!(compare_siblings(folder, file), Ordering::Less);
        assert_eq!(compare_siblings(file, folder), Ordering::Greater);
    }

    #[test]
    fn test_copy_sorts_after_original() {
        let original = (NodeKind::File, "e3.txt");
        let copy = (NodeKind::File, "e3(1).txt");
        assert_eq!(compare_siblings(original, copy), Ordering::Less);
        assert_eq!(
            compare_siblings((NodeKind::File, "F0.txt"), (NodeKind::File, "f1.txt")),
            Ordering::Less
        );
    }

    #[test]
    fn test_numbered_title() {
        assert_eq!(numbered_title("e3.txt", NodeKind::File, 1), "e3(1).txt");
        assert_eq!(numbered_title("e1.txt", NodeKind::Folder, 1), "e1.txt(1)");
        assert_eq!(numbered_title("README", NodeKind::File, 2), "README(2)");
    }

    #[test]
    fn test_unique_title_skips_taken() {
        let taken = ["e3.txt", "e3(1).txt", "E3(2).TXT"];
        let title = unique_title("e3.txt", NodeKind::File, |candidate| {
            taken.iter().any(|t| same_title(t, candidate))
        });
        assert_eq!(title, "e3(3).txt");
    }
}
