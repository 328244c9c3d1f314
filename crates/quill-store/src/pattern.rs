//! Glob matching with the same rules as Redis `SCAN MATCH`.
//!
//! `*` matches any run of characters, `?` a single character, `[abc]`,
//! `[^a]` and `[a-z]` character classes, and `\` escapes the next character.

/// Returns true when `pattern` contains an unescaped wildcard.
#[must_use]
pub fn is_pattern(pattern: &str) -> bool {
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '*' | '?' | '[' => return true,
            _ => {}
        }
    }
    false
}

/// Escapes glob metacharacters so `literal` only matches itself.
#[must_use]
pub fn escape(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Removes escapes from a pattern that has no wildcards.
#[must_use]
pub fn unescape(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Returns true when `key` matches `pattern`.
#[must_use]
pub fn matches(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let s: Vec<char> = key.chars().collect();

    let (mut pi, mut si) = (0, 0);
    // Position after the last `*` and the key index it is currently absorbing up to
    let mut star: Option<(usize, usize)> = None;

    while si < s.len() {
        if pi < p.len() && p[pi] == '*' {
            while pi < p.len() && p[pi] == '*' {
                pi += 1;
            }
            star = Some((pi, si));
            continue;
        }

        if pi < p.len() {
            let (ok, next) = match_one(&p, pi, s[si]);
            if ok {
                pi = next;
                si += 1;
                continue;
            }
        }

        match star {
            Some((star_p, star_s)) => {
                pi = star_p;
                si = star_s + 1;
                star = Some((star_p, star_s + 1));
            }
            None => return false,
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

fn match_one(p: &[char], pi: usize, c: char) -> (bool, usize) {
    match p[pi] {
        '?' => (true, pi + 1),
        '\\' if pi + 1 < p.len() => (p[pi + 1] == c, pi + 2),
        '[' => match_class(p, pi + 1, c),
        literal => (literal == c, pi + 1),
    }
}

fn match_class(p: &[char], mut i: usize, c: char) -> (bool, usize) {
    let negate = i < p.len() && p[i] == '^';
    if negate {
        i += 1;
    }

    let mut matched = false;
    // An unterminated class runs to the end of the pattern.
    while i < p.len() {
        if p[i] == '\\' && i + 1 < p.len() {
            matched |= p[i + 1] == c;
            i += 2;
        } else if p[i] == ']' {
            i += 1;
            break;
        } else if i + 2 < p.len() && p[i + 1] == '-' {
            let (lo, hi) = if p[i] <= p[i + 2] { (p[i], p[i + 2]) } else { (p[i + 2], p[i]) };
            matched |= lo <= c && c <= hi;
            i += 3;
        } else {
            matched |= p[i] == c;
            i += 1;
        }
    }

    (matched != negate, i)
}
