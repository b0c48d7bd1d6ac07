//! Arabic/ASCII text canonicalization for keyword and place-name matching.
//!
//! Social-media Arabic is full of diacritics, tatweel elongation, and
//! interchangeable letter forms (alef/hamza variants, taa marbuta, alef
//! maqsura) that break naive substring matching.  `normalize` collapses all
//! of them to one canonical form; gazetteer names and keyword phrases are
//! passed through the same function so both sides of every comparison agree.

/// Arabic diacritical marks (tashkeel and Quranic annotation ranges).
fn is_diacritic(ch: char) -> bool {
    matches!(ch,
        '\u{0610}'..='\u{061A}' |
        '\u{064B}'..='\u{065F}' |
        '\u{0670}' |
        '\u{06D6}'..='\u{06ED}'
    )
}

/// Bidirectional controls, zero-width (non-)joiners, and BOM — invisible
/// characters that Telegram clients routinely embed in message text.
fn is_invisible(ch: char) -> bool {
    matches!(ch,
        '\u{200B}'..='\u{200F}' |
        '\u{202A}'..='\u{202E}' |
        '\u{2060}'..='\u{2064}' |
        '\u{FEFF}'
    )
}

/// Alef with madda / hamza above / hamza below / wasla.
fn is_alef_variant(ch: char) -> bool {
    matches!(ch, '\u{0622}' | '\u{0623}' | '\u{0625}' | '\u{0671}')
}

fn is_arabic_block(ch: char) -> bool {
    matches!(ch, '\u{0600}'..='\u{06FF}')
}

/// Canonicalize `raw` for substring matching.
///
/// Applied in order: drop invisible controls and diacritics, collapse alef
/// and hamza-carrier variants, drop tatweel, fold taa marbuta to haa and
/// alef maqsura to yaa, lowercase ASCII, strip punctuation (everything that
/// is not whitespace, ASCII alphanumeric, or an Arabic letter), collapse
/// whitespace runs, trim.
///
/// Total function: never fails, empty in gives empty out.  Idempotent:
/// `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;

    for ch in raw.chars() {
        if is_invisible(ch) || is_diacritic(ch) || ch == '\u{0640}' {
            continue;
        }

        let mapped = if is_alef_variant(ch) {
            '\u{0627}' // bare alef
        } else {
            match ch {
                '\u{0624}' => '\u{0648}', // waw with hamza -> waw
                '\u{0626}' => '\u{064A}', // yaa with hamza -> yaa
                '\u{0629}' => '\u{0647}', // taa marbuta -> haa
                '\u{0649}' => '\u{064A}', // alef maqsura -> yaa
                other => other.to_ascii_lowercase(),
            }
        };

        if mapped.is_whitespace() {
            pending_space = true;
            continue;
        }
        let keep = mapped.is_ascii_alphanumeric()
            || (is_arabic_block(mapped) && mapped.is_alphanumeric());
        if !keep {
            // Punctuation acts as a word boundary, not silent deletion:
            // "بيروت،3" must tokenize as two words.  The Arabic block has
            // its own punctuation (،؛؟) which is stripped the same way.
            pending_space = true;
            continue;
        }

        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(mapped);
    }

    out
}
