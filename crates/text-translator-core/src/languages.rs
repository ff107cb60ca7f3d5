//! Language catalog shared by every provider.

/// Pseudo-code meaning "detect the source language".
pub const AUTO: &str = "auto";

/// A language option for pickers and listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageEntry {
    /// Language code as the backends expect it (e.g., "en", "zh-CN")
    pub code: &'static str,
    /// Display name (e.g., "English")
    pub name: &'static str,
}

const fn entry(code: &'static str, name: &'static str) -> LanguageEntry {
    LanguageEntry { code, name }
}

static LANGUAGES: &[LanguageEntry] = &[
    entry(AUTO, "Detect language"),
    entry("af", "Afrikaans"),
    entry("ar", "Arabic"),
    entry("az", "Azerbaijani"),
    entry("be", "Belarusian"),
    entry("bg", "Bulgarian"),
    entry("bn", "Bengali"),
    entry("ca", "Catalan"),
    entry("cs", "Czech"),
    entry("cy", "Welsh"),
    entry("da", "Danish"),
    entry("de", "German"),
    entry("el", "Greek"),
    entry("en", "English"),
    entry("es", "Spanish"),
    entry("et", "Estonian"),
    entry("eu", "Basque"),
    entry("fa", "Persian"),
    entry("fi", "Finnish"),
    entry("fr", "French"),
    entry("ga", "Irish"),
    entry("gl", "Galician"),
    entry("gu", "Gujarati"),
    entry("hi", "Hindi"),
    entry("hr", "Croatian"),
    entry("ht", "HaitianCreole"),
    entry("hu", "Hungarian"),
    entry("hy", "Armenian"),
    entry("id", "Indonesian"),
    entry("is", "Icelandic"),
    entry("it", "Italian"),
    entry("iw", "Hebrew"),
    entry("ja", "Japanese"),
    entry("ka", "Georgian"),
    entry("kn", "Kannada"),
    entry("ko", "Korean"),
    entry("la", "Latin"),
    entry("lo", "Lao"),
    entry("lt", "Lithuanian"),
    entry("lv", "Latvian"),
    entry("mk", "Macedonian"),
    entry("ms", "Malay"),
    entry("mt", "Maltese"),
    entry("nl", "Dutch"),
    entry("no", "Norwegian"),
    entry("pl", "Polish"),
    entry("pt", "Portuguese"),
    entry("ro", "Romanian"),
    entry("ru", "Russian"),
    entry("sk", "Slovak"),
    entry("sl", "Slovenian"),
    entry("sq", "Albanian"),
    entry("sr", "Serbian"),
    entry("sv", "Swedish"),
    entry("sw", "Swahili"),
    entry("ta", "Tamil"),
    entry("te", "Telugu"),
    entry("th", "Thai"),
    entry("tl", "Filipino"),
    entry("tr", "Turkish"),
    entry("uk", "Ukrainian"),
    entry("ur", "Urdu"),
    entry("vi", "Vietnamese"),
    entry("yi", "Yiddish"),
    entry("zh-CN", "Chinese Simplified"),
    entry("zh-TW", "Chinese Traditional"),
];

/// All languages in catalog order.
pub fn languages() -> &'static [LanguageEntry] {
    LANGUAGES
}

/// Display name for a language code, `None` if the code is unknown.
pub fn language_name(code: &str) -> Option<&'static str> {
    LANGUAGES
        .iter()
        .find(|lang| lang.code == code)
        .map(|lang| lang.name)
}

/// Whether `code` is part of the catalog.
pub fn is_known(code: &str) -> bool {
    language_name(code).is_some()
}

/// Sort entries for display: `auto` first, the rest by display name.
pub fn sort_for_display(entries: &mut [LanguageEntry]) {
    entries.sort_by(|a, b| match (a.code == AUTO, b.code == AUTO) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.name.cmp(b.name),
    });
}

/// The full catalog in display order.
pub fn sorted_languages() -> Vec<LanguageEntry> {
    let mut entries = LANGUAGES.to_vec();
    sort_for_display(&mut entries);
    entries
}
