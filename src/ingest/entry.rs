use super::kind::is_markup;
use super::path::{depth, file_name};

const INDEX_FILE: &str = "index.html";

/// Picks the landing page of a project from its manifest paths, in manifest order.
///
/// A sole markup file always wins. Otherwise the shallowest `index.html`
/// (shortest path, then lexicographic, on ties), else the first markup file.
/// Returns `None` when the upload has no markup at all.
pub fn resolve_entry<'a, I>(paths: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let markup: Vec<&str> = paths.into_iter().filter(|p| is_markup(p)).collect();

    if let [only] = markup.as_slice() {
        return Some((*only).to_string());
    }

    let index = markup
        .iter()
        .filter(|p| file_name(p).eq_ignore_ascii_case(INDEX_FILE))
        .min_by(|a, b| {
            depth(a)
                .cmp(&depth(b))
                .then_with(|| a.len().cmp(&b.len()))
                .then_with(|| a.cmp(b))
        });

    index.or(markup.first()).map(|p| (*p).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shallowest_index_wins() {
        let paths = ["a/b/index.html", "a/index.html", "style.css"];
        assert_eq!(resolve_entry(paths), Some("a/index.html".to_string()));
    }

    #[test]
    fn test_sole_markup_file() {
        assert_eq!(resolve_entry(["page.html"]), Some("page.html".to_string()));
        assert_eq!(
            resolve_entry(["css/x.css", "deep/about.htm"]),
            Some("deep/about.htm".to_string())
        );
    }

    #[test]
    fn test_no_markup() {
        assert_eq!(resolve_entry(["readme.txt", "logo.png"]), None);
        assert_eq!(resolve_entry(Vec::<&str>::new()), None);
    }

    #[test]
    fn test_index_is_case_insensitive() {
        let paths = ["about.html", "INDEX.HTML"];
        assert_eq!(resolve_entry(paths), Some("INDEX.HTML".to_string()));
    }

    #[test]
    fn test_index_ties_break_on_length_then_lexicographic() {
        let paths = ["zz/index.html", "b/index.html", "a/index.html", "x/y/index.html"];
        assert_eq!(resolve_entry(paths), Some("a/index.html".to_string()));

        let paths = ["site/index.html", "a/Index.html"];
        assert_eq!(resolve_entry(paths), Some("a/Index.html".to_string()));
    }

    #[test]
    fn test_falls_back_to_first_markup() {
        let paths = ["style.css", "second.html", "first.html"];
        assert_eq!(resolve_entry(paths), Some("second.html".to_string()));
    }

    #[test]
    fn test_independent_of_order_for_index() {
        let forward = ["a/index.html", "index.html", "b.html"];
        let reverse = ["b.html", "index.html", "a/index.html"];
        assert_eq!(resolve_entry(forward), resolve_entry(reverse));
        assert_eq!(resolve_entry(forward), Some("index.html".to_string()));
    }
}
