//! Issuer slugs.

/// Corporate-suffix spellings contracted to one form, so "X Limited" and
/// "X Ltd." share a slug.
const CONTRACTIONS: [(&str, &str); 5] = [
    ("limited", "ltd"),
    ("private", "pvt"),
    ("corporation", "corp"),
    ("company", "co"),
    ("incorporated", "inc"),
];

pub const MAX_SLUG_LEN: usize = 80;

/// Deterministic, URL-safe slug for an issuer name.
///
/// Lowercase ASCII alphanumerics joined by `-`, `&` spelled `and`, known
/// suffixes contracted, capped at [`MAX_SLUG_LEN`] on a word boundary.
pub fn issuer_slug(name: &str) -> String {
    let lowered = name.to_lowercase().replace('&', " and ");
    let words = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| {
            CONTRACTIONS
                .iter()
                .find(|(long, _)| *long == w)
                .map_or(w, |(_, short)| *short)
        });

    let mut slug = String::new();
    for word in words {
        let extra = if slug.is_empty() { word.len() } else { word.len() + 1 };
        if slug.len() + extra > MAX_SLUG_LEN {
            if slug.is_empty() {
                slug.push_str(&word[..MAX_SLUG_LEN]);
            }
            break;
        }
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(word);
    }
    slug
}
