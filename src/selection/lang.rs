//! Small ISO 639 helper for sidecar file language tags.

/// Map a two-letter (ISO 639-1) code to its three-letter terminology
/// code. Three-letter codes pass through; anything unrecognized becomes
/// `und`.
pub(crate) fn to_alpha3(code: &str) -> String {
    let code = code.trim().to_lowercase();
    if code.len() == 3 {
        return code;
    }
    let mapped = match code.as_str() {
        "ar" => "ara",
        "cs" => "ces",
        "da" => "dan",
        "de" => "deu",
        "el" => "ell",
        "en" => "eng",
        "es" => "spa",
        "fi" => "fin",
        "fr" => "fra",
        "he" => "heb",
        "hi" => "hin",
        "hu" => "hun",
        "it" => "ita",
        "ja" => "jpn",
        "ko" => "kor",
        "nb" => "nob",
        "nl" => "nld",
        "no" => "nor",
        "pl" => "pol",
        "pt" => "por",
        "ro" => "ron",
        "ru" => "rus",
        "sv" => "swe",
        "th" => "tha",
        "tr" => "tur",
        "uk" => "ukr",
        "vi" => "vie",
        "zh" => "zho",
        _ => "und",
    };
    mapped.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha2_maps_to_alpha3() {
        assert_eq!(to_alpha3("en"), "eng");
        assert_eq!(to_alpha3("DE"), "deu");
        assert_eq!(to_alpha3("eng"), "eng");
        assert_eq!(to_alpha3("xx"), "und");
    }
}
