//! Tag slugs and the stop-word policy.
//!
//! A slug is lowercase with non-alphanumerics collapsed to single hyphens and
//! accepted only at length >= 4. Slugs equal to a stop word never reach a
//! stored event's tag set.

/// Minimum accepted slug length.
const MIN_SLUG_LEN: usize = 4;

/// Generic terms that carry no topical signal: day and month names, calendar
/// vocabulary, genre-generic nouns, and filler qualifiers. Extended per
/// deployment via `Config::tag_blocklist`.
pub const STOP_WORDS: &[&str] = &[
    // Days
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
    "mondays", "tuesdays", "wednesdays", "thursdays", "fridays", "saturdays", "sundays",
    "weekday", "weekdays", "weekend", "weekends",
    // Months
    "january", "february", "march", "april", "june", "july", "august",
    "september", "october", "november", "december", "sept",
    // Calendar vocabulary
    "date", "dates", "time", "times", "hour", "hours", "minute", "minutes",
    "week", "weeks", "month", "months", "year", "years", "today", "tonight",
    "tomorrow", "yesterday", "morning", "afternoon", "evening", "night",
    "noon", "midnight", "daily", "weekly", "biweekly", "monthly", "quarterly",
    "annual", "annually", "yearly", "seasonal", "schedule", "scheduled",
    "calendar", "upcoming", "ongoing", "recurring", "repeating",
    // Genre-generic nouns
    "event", "events", "class", "classes", "session", "sessions", "series",
    "meeting", "meetings", "program", "programs", "programming", "activity",
    "activities", "happening", "happenings", "occasion", "occasions",
    "gathering", "gatherings", "function", "functions", "thing", "things",
    "stuff", "item", "items", "info", "information", "details", "detail",
    "description", "announcement", "announcements", "notice", "notices",
    "update", "updates", "news", "reminder", "reminders", "opportunity",
    "opportunities", "offering", "offerings", "edition", "editions",
    "installment", "episode", "episodes", "part", "parts", "misc",
    "miscellaneous", "general", "various", "assorted", "other", "others",
    // Place/audience filler
    "community", "local", "area", "nearby", "place", "places", "location",
    "locations", "venue", "venues", "address", "room", "rooms", "building",
    "everyone", "anyone", "anybody", "everybody", "people", "public",
    "attendee", "attendees", "guest", "guests", "member", "members",
    "participant", "participants", "visitor", "visitors",
    // Filler verbs and calls to action
    "join", "joining", "come", "coming", "attend", "attending", "visit",
    "visiting", "register", "registration", "signup", "rsvp", "welcome",
    "invite", "invited", "invitation", "click", "here", "link", "learn",
    "more", "check", "view", "browse", "explore", "discover", "featuring",
    "featured", "presents", "presenting", "presented", "hosted", "hosting",
    "offered", "providing", "provided",
    // Filler qualifiers and adverbs
    "very", "really", "quite", "just", "also", "about", "with", "without",
    "from", "into", "over", "under", "near", "around", "during", "before",
    "after", "between", "through", "throughout", "every", "each", "some",
    "many", "much", "most", "several", "another", "again", "always", "often",
    "sometimes", "together", "soon", "later", "early", "late", "next",
    "last", "first", "second", "third", "final", "great", "good", "best",
    "nice", "awesome", "amazing", "wonderful", "exciting", "interesting",
    "popular", "favorite", "special", "spectacular", "unique", "perfect",
    "plus", "extra", "bonus", "limited", "available", "required", "optional",
    "untitled", "unknown", "none", "null", "test", "temp", "example",
];

/// Normalize a string into a tag slug: lowercase, non-alphanumerics collapsed
/// to single hyphens, trimmed of leading/trailing hyphens. Returns the empty
/// string when the result is shorter than 4 chars.
///
/// ```
/// assert_eq!(hearth_common::slugify("Live Jazz & Blues"), "live-jazz-blues");
/// assert_eq!(hearth_common::slugify("  Yoga!  "), "yoga");
/// assert_eq!(hearth_common::slugify("art"), "");
/// ```
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_hyphen = true; // suppress leading hyphens
    for c in input.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            out.push('-');
            last_was_hyphen = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.len() < MIN_SLUG_LEN {
        return String::new();
    }
    out
}

/// Case- and accent-insensitive comparison key for category names.
/// Lowercases and folds common Latin diacritics so "Música en Vivo" and
/// "musica en vivo" resolve to the same category.
pub fn name_key(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(fold_accent)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        'ñ' => 'n',
        'ç' => 'c',
        _ => c,
    }
}

/// True when the slug is in the fixed stop-word set or the per-deployment
/// blocklist.
pub fn is_stop_word(slug: &str, blocklist: &[String]) -> bool {
    STOP_WORDS.contains(&slug) || blocklist.iter().any(|b| b == slug)
}

/// Slugify, stop-word-filter, sort, and de-duplicate a tag list.
pub fn normalize_tags<I, S>(tags: I, blocklist: &[String]) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = tags
        .into_iter()
        .map(|t| slugify(t.as_ref()))
        .filter(|s| !s.is_empty() && !is_stop_word(s, blocklist))
        .collect();
    out.sort();
    out.dedup();
    out
}
