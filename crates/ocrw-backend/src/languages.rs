//! Language code mapping for Tesseract.
//!
//! Hosts send short ISO-639-1 style codes (`en`, `zh-cn`); Tesseract wants
//! traineddata names (`eng`, `chi_sim`). Codes we don't know are passed through
//! so callers can still ask for any installed traineddata by its own name.

const LANGUAGE_MAP: &[(&str, &str)] = &[
    ("en", "eng"),
    ("zh", "chi_sim"),
    ("zh-cn", "chi_sim"),
    ("zh-tw", "chi_tra"),
    ("ja", "jpn"),
    ("ko", "kor"),
    ("ar", "ara"),
    ("hi", "hin"),
    ("ru", "rus"),
    ("es", "spa"),
    ("fr", "fra"),
    ("de", "deu"),
    ("it", "ita"),
    ("pt", "por"),
    ("pl", "pol"),
    ("nl", "nld"),
    ("tr", "tur"),
];

/// Map one host language code to a Tesseract language name.
pub fn to_tesseract(code: &str) -> String {
    let lower = code.to_lowercase();
    LANGUAGE_MAP
        .iter()
        .find(|(short, _)| *short == lower)
        .map(|(_, tess)| tess.to_string())
        .unwrap_or_else(|| code.to_string())
}

/// Build the `-l` argument, e.g. `eng+deu`. Order is preserved.
pub fn tesseract_arg(codes: &[String]) -> String {
    codes
        .iter()
        .map(|c| to_tesseract(c))
        .collect::<Vec<_>>()
        .join("+")
}
