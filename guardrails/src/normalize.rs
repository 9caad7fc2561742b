//! Text normalization for keyword scanning.
//!
//! Undoes the common tricks students use to slip words past a filter:
//! leetspeak, spelled-out letters and stretched characters. The output is
//! only ever used for matching, never shown back to anyone.

use regex::Regex;
use std::sync::LazyLock;

/// Three or more single letters joined by one repeated separator.
static DOTTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b\pL(?:\.\pL){2,}\b|\b\pL(?:-\pL){2,}\b|\b\pL(?:_\pL){2,}\b|\b\pL(?:\*\pL){2,}\b",
    )
    .expect("static pattern")
});

/// Normalize a message for keyword scanning.
///
/// Steps, in order: lowercase, leetspeak reversal, dotted-letter join,
/// punctuation to spaces, repeated-character collapse, spelled-out word
/// collapse, a second repeated-character collapse, whitespace collapse.
///
/// Dotted letters (`f.u.c.k`, `s-h-i-t`) are joined only within one
/// separator, so neighbouring words stay apart. Space-separated letters
/// are joined when at least three remain after any leading `a` or `i`
/// words, which are kept as words.
///
/// The result is stable: normalizing an already normalized string returns
/// it unchanged.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();

    let unleeted = lowered
        .split_whitespace()
        .map(reverse_leet)
        .collect::<Vec<_>>()
        .join(" ");

    let undotted = DOTTED.replace_all(&unleeted, |caps: &regex::Captures<'_>| {
        caps[0].chars().filter(|c| c.is_alphabetic()).collect::<String>()
    });

    let spaced: String = undotted
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let spaced = collapse_whitespace(&spaced);

    let squeezed = collapse_repeats(&spaced);
    let joined = join_spelled_out(&squeezed);

    collapse_whitespace(&collapse_repeats(&joined))
}

/// Map leetspeak symbols back to letters inside a single token.
///
/// Tokens without any letter are left alone so that plain numbers keep
/// their value. `!` and `|` only count as letters when something
/// alphanumeric follows them, so trailing exclamation marks stay
/// punctuation.
fn reverse_leet(token: &str) -> String {
    if !token.chars().any(char::is_alphabetic) {
        return token.to_string();
    }

    let chars: Vec<char> = token.chars().collect();
    let mut out = String::with_capacity(token.len());

    for (i, &c) in chars.iter().enumerate() {
        let interior = chars
            .get(i + 1)
            .is_some_and(|next| next.is_alphanumeric() || leet_letter(*next).is_some());

        let mapped = match c {
            '!' | '|' if interior => 'i',
            '!' | '|' => c,
            _ => leet_letter(c).unwrap_or(c),
        };
        out.push(mapped);
    }

    out
}

fn leet_letter(c: char) -> Option<char> {
    match c {
        '0' => Some('o'),
        '1' => Some('i'),
        '3' => Some('e'),
        '4' | '@' => Some('a'),
        '5' | '$' => Some('s'),
        '7' => Some('t'),
        '8' => Some('b'),
        _ => None,
    }
}

/// Collapse any character repeated three or more times in a row to one.
fn collapse_repeats(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }

        if run >= 3 {
            out.push(c);
        } else {
            out.extend(std::iter::repeat(c).take(run));
        }
        i += run;
    }

    out
}

/// Join runs of single-letter words, keeping leading `a` and `i` words.
fn join_spelled_out(text: &str) -> String {
    let tokens: Vec<&str> = text.split(' ').collect();
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    let mut i = 0;

    while i < tokens.len() {
        if !is_single_letter(tokens[i]) {
            out.push(tokens[i].to_string());
            i += 1;
            continue;
        }

        let start = i;
        while i < tokens.len() && is_single_letter(tokens[i]) {
            i += 1;
        }
        let run = &tokens[start..i];
        let kept = run.iter().take_while(|t| matches!(**t, "a" | "i")).count();

        if run.len() - kept >= 3 {
            out.extend(run[..kept].iter().map(|t| t.to_string()));
            out.push(run[kept..].concat());
        } else {
            out.extend(run.iter().map(|t| t.to_string()));
        }
    }

    out.join(" ")
}

fn is_single_letter(token: &str) -> bool {
    let mut chars = token.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_and_whitespace() {
        assert_eq!(normalize("  What   IS\tThis  "), "what is this");
    }

    #[test]
    fn test_leetspeak() {
        assert_eq!(normalize("sh!t"), "shit");
        assert_eq!(normalize("5h1t"), "shit");
        assert_eq!(normalize("@$$hole"), "asshole");
    }

    #[test]
    fn test_numbers_without_letters_survive() {
        assert_eq!(normalize("what is 3 + 4?"), "what is 3 4");
    }

    #[test]
    fn test_trailing_exclamation_is_punctuation() {
        assert_eq!(normalize("hello there!"), "hello there");
    }

    #[test]
    fn test_separator_obfuscation() {
        assert_eq!(normalize("f.u.c.k"), "fuck");
        assert_eq!(normalize("f u c k off"), "fuck off");
        assert_eq!(normalize("s-h-i-t"), "shit");
    }

    #[test]
    fn test_repeated_characters() {
        assert_eq!(normalize("fuuuck"), "fuck");
        assert_eq!(normalize("noooo waaay"), "no way");
        // Doubles are real spelling.
        assert_eq!(normalize("assessment"), "assessment");
    }

    #[test]
    fn test_stretched_and_spelled_out() {
        assert_eq!(normalize("f.u.u.u.c.k"), "fuck");
    }

    #[test]
    fn test_articles_stay_words() {
        assert_eq!(normalize("what a s.h.i.t day"), "what a shit day");
        assert_eq!(normalize("you are a f.u.c.k.i.n.g idiot"), "you are a fucking idiot");
        assert_eq!(normalize("i f u c k e d up"), "i fucked up");
        assert_eq!(normalize("a b c"), "a b c");
    }

    #[test]
    fn test_dotted_words_stay_apart() {
        assert_eq!(normalize("f.u.c.k y.o.u"), "fuck you");
        assert_eq!(normalize("s_h_i_t and f*u*c*k"), "shit and fuck");
    }

    #[test]
    fn test_idempotent() {
        for sample in [
            "what a s.h.i.t day",
            "f.u.c.k y.o.u",
            "i f u c k e d up",
            "F.U.C.K this",
            "aaa b c",
            "a,b,c",
            "Explain quadratic equations!!!",
            "d0n't t3ll y0ur p@rents",
            "wow!!! 7th grade",
        ] {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not stable for {sample:?}");
        }
    }
}
