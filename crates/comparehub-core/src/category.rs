//! Category normalization for feed and admin input.
//!
//! Only known synonyms are rewritten; any other non-empty category keeps the
//! casing it arrived with.

/// Label used when no category is supplied.
pub const OTHER: &str = "Other";

const SYNONYMS: &[(&str, &[&str])] = &[
  ("Phones", &["phone", "phones", "mobile", "mobiles"]),
  ("Laptops", &["laptop", "laptops", "notebook", "notebooks"]),
  ("Headphones", &[
    "headphone",
    "headphones",
    "earbud",
    "earbuds",
    "earphone",
    "earphones",
  ]),
];

/// Map a raw category string onto the canonical vocabulary.
///
/// Total and infallible: blank input yields [`OTHER`], unknown input is
/// returned trimmed.
pub fn normalize(raw: &str) -> String {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return OTHER.to_owned();
  }

  let spaced = trimmed
    .to_lowercase()
    .replace(['-', '_', '/'], " ");
  let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
  // "Lap-Tops" collapses to "lap tops"; match the joined form as well.
  let joined = collapsed.replace(' ', "");

  for (label, words) in SYNONYMS {
    if words.iter().any(|w| *w == collapsed || *w == joined) {
      return (*label).to_owned();
    }
  }

  trimmed.to_owned()
}
