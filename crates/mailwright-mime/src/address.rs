//! Address header parsing and rendering.
//!
//! Splits free-text address fields such as
//! `"Jane Doe" <jane@example.com>, bob@example.org` into structured
//! mailboxes, and renders them back into header-safe text.

use crate::encoding::{WordEncoding, encode_word, is_plain_text};

/// Mailbox (display name + address).
///
/// Either field may be empty: an unnamed address has an empty `name`, a
/// bare word without `@` becomes a name with an empty `address`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mailbox {
    /// Display name.
    pub name: String,
    /// Email address.
    pub address: String,
}

impl Mailbox {
    /// Creates an unnamed mailbox.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            address: address.into(),
        }
    }

    /// Creates a mailbox with a display name.
    #[must_use]
    pub fn with_name(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// One entry of an address list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressEntry {
    /// A single mailbox.
    Mailbox(Mailbox),
    /// A named group (`Friends: a@example.com, b@example.com;`).
    Group {
        /// Group display name.
        name: String,
        /// Group members.
        members: Vec<Mailbox>,
    },
}

impl AddressEntry {
    /// Returns the mailboxes of this entry, flattening groups.
    #[must_use]
    pub fn mailboxes(&self) -> &[Mailbox] {
        match self {
            Self::Mailbox(mailbox) => std::slice::from_ref(mailbox),
            Self::Group { members, .. } => members,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    Comment(String),
    Angle(String),
    Comma,
    Colon,
    Semicolon,
}

/// Parses an address header value into entries, in order.
#[must_use]
pub fn parse_addresses(text: &str) -> Vec<AddressEntry> {
    let mut entries = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let mut group: Option<(String, Vec<Mailbox>)> = None;

    for token in tokenize(text) {
        match token {
            Token::Colon if group.is_none() => {
                group = Some((display_text(&current), Vec::new()));
                current.clear();
            }
            Token::Comma | Token::Semicolon => {
                if let Some(mailbox) = build_mailbox(&current) {
                    match group.as_mut() {
                        Some((_, members)) => members.push(mailbox),
                        None => entries.push(AddressEntry::Mailbox(mailbox)),
                    }
                }
                current.clear();
                if token == Token::Semicolon {
                    if let Some((name, members)) = group.take() {
                        entries.push(AddressEntry::Group { name, members });
                    }
                }
            }
            other => current.push(other),
        }
    }

    if let Some(mailbox) = build_mailbox(&current) {
        match group.as_mut() {
            Some((_, members)) => members.push(mailbox),
            None => entries.push(AddressEntry::Mailbox(mailbox)),
        }
    }
    if let Some((name, members)) = group {
        entries.push(AddressEntry::Group { name, members });
    }

    entries
}

/// Parses an address header value into mailboxes, flattening groups.
#[must_use]
pub fn parse_mailboxes(text: &str) -> Vec<Mailbox> {
    parse_addresses(text)
        .iter()
        .flat_map(|entry| entry.mailboxes().to_vec())
        .collect()
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut chars = text.chars();

    let flush = |word: &mut String, tokens: &mut Vec<Token>| {
        if !word.is_empty() {
            tokens.push(Token::Word(std::mem::take(word)));
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                flush(&mut word, &mut tokens);
                let mut quoted = String::new();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => quoted.extend(chars.next()),
                        '"' => break,
                        _ => quoted.push(c),
                    }
                }
                tokens.push(Token::Quoted(quoted));
            }
            '(' => {
                flush(&mut word, &mut tokens);
                let mut comment = String::new();
                let mut depth = 1;
                for c in chars.by_ref() {
                    match c {
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    comment.push(c);
                }
                tokens.push(Token::Comment(comment.trim().to_string()));
            }
            '<' => {
                flush(&mut word, &mut tokens);
                let angle: String = chars.by_ref().take_while(|&c| c != '>').collect();
                tokens.push(Token::Angle(angle.trim().to_string()));
            }
            ',' => {
                flush(&mut word, &mut tokens);
                tokens.push(Token::Comma);
            }
            ';' => {
                flush(&mut word, &mut tokens);
                tokens.push(Token::Semicolon);
            }
            ':' => {
                flush(&mut word, &mut tokens);
                tokens.push(Token::Colon);
            }
            c if c.is_whitespace() => flush(&mut word, &mut tokens),
            _ => word.push(c),
        }
    }
    flush(&mut word, &mut tokens);

    tokens
}

fn display_text(tokens: &[Token]) -> String {
    tokens
        .iter()
        .filter_map(|token| match token {
            Token::Word(text) | Token::Quoted(text) => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_bare_address(word: &str) -> bool {
    let mut parts = word.split('@');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty()
    ) && !word.chars().any(char::is_whitespace)
}

fn build_mailbox(tokens: &[Token]) -> Option<Mailbox> {
    if tokens.is_empty() {
        return None;
    }

    let mut address = tokens.iter().find_map(|token| match token {
        Token::Angle(addr) => Some(addr.clone()),
        _ => None,
    });

    let mut words: Vec<&Token> = tokens
        .iter()
        .filter(|token| matches!(token, Token::Word(_) | Token::Quoted(_)))
        .collect();

    if address.is_none() {
        // Last bare local@domain word is the address
        let position = words
            .iter()
            .rposition(|token| matches!(token, Token::Word(w) if is_bare_address(w)));
        if let Some(idx) = position {
            if let Token::Word(word) = words.remove(idx) {
                address = Some(word.clone());
            }
        }
    }

    let mut name = words
        .iter()
        .filter_map(|token| match token {
            Token::Word(text) | Token::Quoted(text) => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ");

    if name.is_empty() {
        name = tokens
            .iter()
            .filter_map(|token| match token {
                Token::Comment(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ");
    }

    let address = address.unwrap_or_default();
    if address.is_empty() && name.is_empty() {
        return None;
    }
    if name == address {
        name.clear();
    }

    Some(Mailbox { name, address })
}

/// Normalizes an address for envelope use.
///
/// The local part is left untouched; the domain is lowercased and converted
/// to its ASCII (punycode) form.
#[must_use]
pub fn normalize_address(address: &str) -> String {
    let address = address.trim();
    let Some(at) = address.rfind('@') else {
        return address.to_string();
    };
    let (local, domain) = (&address[..at], &address[at + 1..]);
    let lower = domain.to_lowercase();
    let domain = idna::domain_to_ascii(&lower).unwrap_or(lower);
    format!("{local}@{domain}")
}

fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~ ".contains(c)
}

/// Renders a display name for use in a header.
fn format_name(name: &str, encoding: Option<WordEncoding>) -> String {
    if !is_plain_text(name) {
        let encoding = encoding.unwrap_or_else(|| WordEncoding::select(name));
        return encode_word(name, encoding);
    }
    if name.chars().all(is_atext) {
        return name.to_string();
    }
    let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Renders a mailbox as header text (`address` or `Name <address>`).
#[must_use]
pub fn format_mailbox(mailbox: &Mailbox, encoding: Option<WordEncoding>) -> String {
    let address = if mailbox.address.is_empty() {
        String::new()
    } else {
        normalize_address(&mailbox.address)
    };

    if mailbox.name.is_empty() {
        return address;
    }
    let name = format_name(&mailbox.name, encoding);
    if address.is_empty() {
        return name;
    }
    format!("{name} <{address}>")
}

/// Renders an address list as header text, entries separated by `, `.
#[must_use]
pub fn format_addresses(entries: &[AddressEntry], encoding: Option<WordEncoding>) -> String {
    entries
        .iter()
        .map(|entry| match entry {
            AddressEntry::Mailbox(mailbox) => format_mailbox(mailbox, encoding),
            AddressEntry::Group { name, members } => {
                let members = members
                    .iter()
                    .map(|member| format_mailbox(member, encoding))
                    .collect::<Vec<_>>()
                    .join(", ");
                let separator = if members.is_empty() { "" } else { " " };
                format!("{}:{separator}{members};", format_name(name, encoding))
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn parse_named_address() {
        assert_eq!(
            parse_mailboxes("Jane Doe <jane@example.com>"),
            vec![Mailbox::with_name("Jane Doe", "jane@example.com")]
        );
    }

    #[test]
    fn parse_bare_address() {
        assert_eq!(
            parse_mailboxes("jane@example.com"),
            vec![Mailbox::new("jane@example.com")]
        );
    }

    #[test]
    fn parse_list() {
        let parsed = parse_mailboxes("\"Jane Doe\" <jane@example.com>, bob@example.org");
        assert_eq!(
            parsed,
            vec![
                Mailbox::with_name("Jane Doe", "jane@example.com"),
                Mailbox::new("bob@example.org"),
            ]
        );
    }

    #[test]
    fn parse_quoted_name_with_comma() {
        assert_eq!(
            parse_mailboxes("\"Doe, Jane\" <jane@example.com>"),
            vec![Mailbox::with_name("Doe, Jane", "jane@example.com")]
        );
    }

    #[test]
    fn parse_escaped_quote() {
        assert_eq!(
            parse_mailboxes(r#""Jane \"JD\" Doe" <jane@example.com>"#),
            vec![Mailbox::with_name("Jane \"JD\" Doe", "jane@example.com")]
        );
    }

    #[test]
    fn parse_comment_as_name() {
        assert_eq!(
            parse_mailboxes("jane@example.com (Jane Doe)"),
            vec![Mailbox::with_name("Jane Doe", "jane@example.com")]
        );
    }

    #[test]
    fn parse_trailing_bare_address_with_name() {
        assert_eq!(
            parse_mailboxes("Jane Doe jane@example.com"),
            vec![Mailbox::with_name("Jane Doe", "jane@example.com")]
        );
    }

    #[test]
    fn name_equal_to_address_is_cleared() {
        assert_eq!(
            parse_mailboxes("jane@example.com <jane@example.com>"),
            vec![Mailbox::new("jane@example.com")]
        );
    }

    #[test]
    fn word_without_at_is_a_name() {
        assert_eq!(
            parse_mailboxes("undisclosed"),
            vec![Mailbox::with_name("undisclosed", "")]
        );
    }

    #[test]
    fn parse_group() {
        let parsed = parse_addresses("Friends: a@example.com, \"B\" <b@example.com>;, c@example.org");
        assert_eq!(
            parsed,
            vec![
                AddressEntry::Group {
                    name: "Friends".into(),
                    members: vec![
                        Mailbox::new("a@example.com"),
                        Mailbox::with_name("B", "b@example.com"),
                    ],
                },
                AddressEntry::Mailbox(Mailbox::new("c@example.org")),
            ]
        );
        assert_eq!(parse_mailboxes("Friends: a@example.com, b@example.com;").len(), 2);
    }

    #[test]
    fn parse_empty() {
        assert!(parse_addresses("").is_empty());
        assert!(parse_addresses(" , ").is_empty());
    }

    #[test]
    fn normalize_punycodes_domain_only() {
        assert_eq!(normalize_address("Jane@JÕGEVA.ee"), "Jane@xn--jgeva-dua.ee");
        assert_eq!(normalize_address("Jane@Example.COM"), "Jane@example.com");
        assert_eq!(normalize_address("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn format_plain_name() {
        let mailbox = Mailbox::with_name("Jane Doe", "jane@example.com");
        assert_eq!(format_mailbox(&mailbox, None), "Jane Doe <jane@example.com>");
    }

    #[test]
    fn format_quoted_name() {
        let mailbox = Mailbox::with_name("Doe, \"JD\" Jane", "jane@example.com");
        assert_eq!(
            format_mailbox(&mailbox, None),
            r#""Doe, \"JD\" Jane" <jane@example.com>"#
        );
    }

    #[test]
    fn format_encoded_name() {
        let mailbox = Mailbox::with_name("Jürgen", "j@example.com");
        assert_eq!(
            format_mailbox(&mailbox, None),
            "=?UTF-8?Q?J=C3=BCrgen?= <j@example.com>"
        );
    }

    #[test]
    fn format_unnamed() {
        assert_eq!(format_mailbox(&Mailbox::new("a@example.com"), None), "a@example.com");
    }

    #[test]
    fn format_group() {
        let entries = parse_addresses("Team: a@example.com, b@example.com;");
        assert_eq!(
            format_addresses(&entries, None),
            "Team: a@example.com, b@example.com;"
        );
        let empty = vec![AddressEntry::Group {
            name: "Undisclosed recipients".into(),
            members: vec![],
        }];
        assert_eq!(format_addresses(&empty, None), "Undisclosed recipients:;");
    }
}
