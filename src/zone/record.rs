//! Editing of a single `A` record inside a user zone, for dynamic updates.
//!
//! The zone text is scanned line by line, tracking `$ORIGIN`, inherited owner names and
//! parenthesised continuation lines, to find the `A` records owned by the target name:
//!
//! * exactly one: its address is replaced in place, keeping TTL, class and comments.
//! * none: a fully qualified `A` record is appended.
//! * more than one: the update is refused, the user has to edit the zone themselves.

use crate::error::Error;
use std::net::Ipv4Addr;
use std::str::FromStr;
use trust_dns_client::rr::{LowerName, Name};

const CLASSES: [&str; 4] = ["IN", "CH", "HS", "CS"];

struct Token<'a> {
    start: usize,
    text: &'a str,
}

impl Token<'_> {
    fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

fn update_err(reason: impl Into<String>) -> Error {
    Error::RecordUpdate(reason.into())
}

/// Set the address of `hostname` (relative to `origin`, `@`, or fully qualified within it) to
/// `addr` in `zone`, returning the edited zone text.
///
/// # Errors
///
/// Returns [`Error::RecordUpdate`] if the hostname is invalid or outside `origin`, if there's
/// more than one `A` record for it, or if the zone can't be followed safely.
pub fn set_a_record(
    zone: &str,
    origin: &Name,
    hostname: &str,
    addr: Ipv4Addr,
) -> Result<String, Error> {
    let target = target_name(origin, hostname)?;
    let target_lower = LowerName::from(&target);

    let lines: Vec<&str> = zone.split_inclusive('\n').collect();
    let mut current_origin = origin.clone();
    let mut last_owner: Option<LowerName> = None;
    let mut depth = 0;
    let mut found: Vec<(usize, usize, usize)> = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let (data, parens) = strip_comment(line);
        let continuation = depth > 0;
        depth += parens;
        if continuation {
            continue;
        }

        let tokens = tokenize(data);
        let Some(first) = tokens.first() else {
            continue;
        };

        if first.text.starts_with('$') {
            match first.text.to_ascii_uppercase().as_str() {
                "$ORIGIN" => {
                    let Some(new_origin) = tokens.get(1) else {
                        return Err(update_err(format!("$ORIGIN without a name on line {}", idx + 1)));
                    };
                    current_origin = resolve(new_origin.text, &current_origin)?;
                }
                "$INCLUDE" => {
                    return Err(update_err("zones using $INCLUDE can't be updated dynamically"))
                }
                _ => {}
            }
            continue;
        }

        let (owner, rest) = if line.starts_with([' ', '\t']) {
            (last_owner.clone(), &tokens[..])
        } else {
            let owner = LowerName::from(resolve(first.text, &current_origin)?);
            (Some(owner), &tokens[1..])
        };
        last_owner = owner.clone();

        let Some(type_at) = rest
            .iter()
            .position(|t| !is_ttl(t.text) && !is_class(t.text))
        else {
            continue;
        };
        if !rest[type_at].text.eq_ignore_ascii_case("A") || owner.as_ref() != Some(&target_lower) {
            continue;
        }
        match &rest[type_at + 1..] {
            [rdata] => found.push((idx, rdata.start, rdata.end())),
            _ => {
                return Err(update_err(format!(
                    "can't parse the A record for {target} on line {}",
                    idx + 1
                )))
            }
        }
    }

    match found.as_slice() {
        [] => {
            let mut edited = zone.to_string();
            if !edited.is_empty() && !edited.ends_with('\n') {
                edited.push('\n');
            }
            edited.push_str(&format!("{target}\tIN\tA\t{addr}\n"));
            Ok(edited)
        }
        [(line_idx, start, end)] => Ok(lines
            .iter()
            .enumerate()
            .map(|(idx, line)| {
                if idx == *line_idx {
                    format!("{}{addr}{}", &line[..*start], &line[*end..])
                } else {
                    (*line).to_string()
                }
            })
            .collect()),
        _ => Err(update_err(format!(
            "{} A records exist for {target}, edit the zone file instead",
            found.len()
        ))),
    }
}

/// The fully qualified name `hostname` refers to within `origin`.
///
/// # Errors
///
/// Returns [`Error::RecordUpdate`] for invalid hostnames and names outside `origin`.
pub fn target_name(origin: &Name, hostname: &str) -> Result<Name, Error> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
    if hostname != "@" && (hostname.is_empty() || !hostname.chars().all(allowed)) {
        return Err(update_err(format!("invalid hostname \"{hostname}\"")));
    }
    let name = resolve(hostname, origin)?;
    if !origin.zone_of(&name) {
        return Err(update_err(format!("{name} is outside of {origin}")));
    }
    Ok(name)
}

/// Resolve a zone file name against the current origin.
fn resolve(name: &str, origin: &Name) -> Result<Name, Error> {
    if name == "@" {
        return Ok(origin.clone());
    }
    let parsed =
        Name::from_str(name).map_err(|err| update_err(format!("invalid name \"{name}\": {err}")))?;
    if parsed.is_fqdn() {
        return Ok(parsed);
    }
    parsed
        .append_domain(origin)
        .map_err(|err| update_err(format!("invalid name \"{name}\": {err}")))
}

/// Cut the comment off `line`, also returning the net count of opened parentheses.
fn strip_comment(line: &str) -> (&str, i32) {
    let mut quoted = false;
    let mut escaped = false;
    let mut parens = 0;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => quoted = !quoted,
            '(' if !quoted => parens += 1,
            ')' if !quoted => parens -= 1,
            ';' if !quoted => return (&line[..i], parens),
            _ => {}
        }
    }
    (line, parens)
}

fn tokenize(data: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, c) in data.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                tokens.push(Token {
                    start: s,
                    text: &data[s..i],
                });
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            start: s,
            text: &data[s..],
        });
    }
    tokens
}

fn is_ttl(token: &str) -> bool {
    token.starts_with(|c: char| c.is_ascii_digit())
}

fn is_class(token: &str) -> bool {
    CLASSES.iter().any(|class| token.eq_ignore_ascii_case(class))
        || token.to_ascii_uppercase().starts_with("CLASS")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONE: &str = "$ORIGIN carol.example.com.
$TTL 3600
@\tIN\tSOA\tns1.example.com. hostmaster.example.com. (
\t\t2026101600\t; serial
\t\t3600 900 604800 300 )
@\tIN\tNS\tns1.example.com.
@\tIN\tA\t192.0.2.1
";

    fn origin() -> Name {
        Name::from_str("carol.example.com.").unwrap()
    }

    fn addr() -> Ipv4Addr {
        Ipv4Addr::new(203, 0, 113, 5)
    }

    #[test]
    fn appends_missing_record() {
        let edited = set_a_record(ZONE, &origin(), "home", addr()).unwrap();
        assert!(edited.starts_with(ZONE));
        assert!(edited.ends_with("home.carol.example.com.\tIN\tA\t203.0.113.5\n"));
    }

    #[test]
    fn replaces_single_record_in_place() {
        let zone = format!("{ZONE}home 300 IN A 198.51.100.9 ; router\nwww\tIN\tCNAME\thome\n");
        let edited = set_a_record(&zone, &origin(), "home", addr()).unwrap();
        assert!(edited.contains("home 300 IN A 203.0.113.5 ; router\n"));
        assert!(!edited.contains("198.51.100.9"));
        assert!(edited.contains("www\tIN\tCNAME\thome\n"));
    }

    #[test]
    fn apex_and_fqdn_hostnames() {
        let edited = set_a_record(ZONE, &origin(), "@", addr()).unwrap();
        assert!(edited.contains("@\tIN\tA\t203.0.113.5\n"));
        assert!(!edited.contains("192.0.2.1"));

        let edited = set_a_record(ZONE, &origin(), "CAROL.example.com.", addr()).unwrap();
        assert!(edited.contains("@\tIN\tA\t203.0.113.5\n"));
    }

    #[test]
    fn inherited_owner_and_origin_changes() {
        let zone = format!(
            "{ZONE}$ORIGIN lab.carol.example.com.\nhome\tIN\tTXT\t\"x\"\n\tIN\tA\t198.51.100.9\n"
        );
        let edited = set_a_record(&zone, &origin(), "home.lab", addr()).unwrap();
        assert!(edited.contains("\tIN\tA\t203.0.113.5\n"));
        assert!(!edited.contains("198.51.100.9"));

        // "home" now means home.lab.carol.example.com., so carol's own home is appended.
        let edited = set_a_record(&zone, &origin(), "home", addr()).unwrap();
        assert!(edited.contains("198.51.100.9"));
        assert!(edited.ends_with("home.carol.example.com.\tIN\tA\t203.0.113.5\n"));
    }

    #[test]
    fn ambiguous_records_are_refused() {
        let zone = format!("{ZONE}home IN A 198.51.100.9\nhome IN A 198.51.100.10\n");
        assert!(matches!(
            set_a_record(&zone, &origin(), "home", addr()),
            Err(Error::RecordUpdate(_))
        ));
    }

    #[test]
    fn foreign_or_invalid_hostnames_are_refused() {
        for hostname in ["www.example.org.", "example.com.", "bad host", "", "x;y"] {
            assert!(
                matches!(
                    set_a_record(ZONE, &origin(), hostname, addr()),
                    Err(Error::RecordUpdate(_))
                ),
                "{hostname}"
            );
        }
    }

    #[test]
    fn include_is_refused() {
        let zone = format!("{ZONE}$INCLUDE /etc/passwd\n");
        assert!(matches!(
            set_a_record(&zone, &origin(), "home", addr()),
            Err(Error::RecordUpdate(_))
        ));
    }

    #[test]
    fn zone_without_trailing_newline() {
        let edited = set_a_record("@ IN NS ns1.example.com.", &origin(), "home", addr()).unwrap();
        assert_eq!(
            edited,
            "@ IN NS ns1.example.com.\nhome.carol.example.com.\tIN\tA\t203.0.113.5\n"
        );
    }
}
