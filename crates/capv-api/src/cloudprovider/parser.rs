//! Reading the INI dialect consumed by the vSphere cloud provider.
//!
//! The dialect is the one understood by the `gcfg` library: section headers
//! with optional quoted subsections (`[VirtualCenter "10.0.0.1"]`), `name =
//! value` pairs, quoted and unquoted values and `;` / `#` comments. Only the
//! `\\`, `\"` and `\t` escape sequences are recognized.
//!
//! `rust-ini` splits the document into sections and variables. It runs with
//! quoting and escaping disabled so that the raw text reaches
//! [`parse_value`], which applies the rules above. Mapping sections and
//! variables onto configuration fields is left to the caller.
use ini::{Ini, ParseOption};
use snafu::{OptionExt, Snafu, ensure};

type Result<T, E = ParseError> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum ParseError {
    #[snafu(display("invalid INI syntax at {line}:{column}: {message}"))]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[snafu(display("invalid section header {header:?}"))]
    InvalidSectionHeader { header: String },

    #[snafu(display("unterminated subsection name in section header {header:?}"))]
    UnterminatedSubsection { header: String },

    #[snafu(display("invalid escape sequence \"\\{found}\" in {context}"))]
    InvalidEscape { context: String, found: char },

    #[snafu(display("backslash at end of {context}"))]
    DanglingEscape { context: String },

    #[snafu(display("invalid variable name {name:?}"))]
    InvalidVariableName { name: String },

    #[snafu(display("variable {name:?} must be inside a section"))]
    VariableOutsideSection { name: String },

    #[snafu(display("unterminated quoted string in variable {variable:?}"))]
    UnterminatedQuote { variable: String },
}

/// A section of the document with its decoded variables, in document order.
#[derive(Debug, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub subsection: Option<String>,
    pub variables: Vec<(String, String)>,
}

/// Parses an INI document into its sections.
///
/// A section which occurs multiple times is returned once per occurrence.
pub fn parse(input: &str) -> Result<Vec<Section>> {
    let option = ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    };
    let document = Ini::load_from_str_opt(input, option).map_err(|error| ParseError::Syntax {
        line: error.line,
        column: error.col,
        message: error.msg.to_string(),
    })?;

    let mut sections = Vec::new();
    for (header, properties) in document.iter() {
        let Some(header) = header else {
            if let Some((name, _)) = properties.iter().next() {
                return VariableOutsideSectionSnafu { name }.fail();
            }
            continue;
        };

        let (name, subsection) = parse_section_header(header)?;
        let variables = properties
            .iter()
            .map(|(variable, raw)| -> Result<(String, String)> {
                ensure!(
                    is_valid_variable_name(variable),
                    InvalidVariableNameSnafu { name: variable }
                );
                Ok((variable.to_owned(), parse_value(variable, raw)?))
            })
            .collect::<Result<_>>()?;

        sections.push(Section {
            name,
            subsection,
            variables,
        });
    }

    Ok(sections)
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn is_valid_variable_name(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Splits the text between the brackets of a section header into the section
/// name and the decoded subsection name.
fn parse_section_header(header: &str) -> Result<(String, Option<String>)> {
    let name_len = header
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '.'))
        .unwrap_or(header.len());
    let (name, rest) = header.split_at(name_len);
    ensure!(!name.is_empty(), InvalidSectionHeaderSnafu { header });

    let rest = rest.trim_start_matches(is_blank);
    if rest.is_empty() {
        return Ok((name.to_owned(), None));
    }

    let quoted = rest
        .strip_prefix('"')
        .context(InvalidSectionHeaderSnafu { header })?;
    let (subsection, trailing) = parse_subsection(header, quoted)?;
    ensure!(
        trailing.trim_matches(is_blank).is_empty(),
        InvalidSectionHeaderSnafu { header }
    );

    Ok((name.to_owned(), Some(subsection)))
}

/// Reads a quoted subsection name up to the closing quote. Returns the decoded
/// name and the remaining input after the quote.
fn parse_subsection<'a>(header: &str, input: &'a str) -> Result<(String, &'a str)> {
    let mut subsection = String::new();
    let mut chars = input.char_indices();

    while let Some((index, c)) = chars.next() {
        match c {
            '"' => return Ok((subsection, &input[index + 1..])),
            '\\' => {
                let context = || format!("section header {header:?}");
                let (_, escaped) = chars.next().context(DanglingEscapeSnafu {
                    context: context(),
                })?;
                match escaped {
                    '\\' | '"' => subsection.push(escaped),
                    found => {
                        return InvalidEscapeSnafu {
                            context: context(),
                            found,
                        }
                        .fail();
                    }
                }
            }
            c => subsection.push(c),
        }
    }

    UnterminatedSubsectionSnafu { header }.fail()
}

/// Decodes the raw value of `variable`.
///
/// Unquoted whitespace at either end is dropped while everything between
/// double quotes is kept verbatim. Quoted and unquoted parts may be mixed. An
/// unquoted `;` or `#` starts a comment.
fn parse_value(variable: &str, raw: &str) -> Result<String> {
    let mut value = String::new();
    let mut pending_blanks = String::new();
    let mut started = false;
    let mut quoted = false;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let context = || format!("variable {variable:?}");
                let escaped = chars.next().context(DanglingEscapeSnafu {
                    context: context(),
                })?;
                let decoded = match escaped {
                    '\\' => '\\',
                    '"' => '"',
                    't' => '\t',
                    found => {
                        return InvalidEscapeSnafu {
                            context: context(),
                            found,
                        }
                        .fail();
                    }
                };
                value.push_str(&pending_blanks);
                pending_blanks.clear();
                value.push(decoded);
                started = true;
            }
            '"' => {
                value.push_str(&pending_blanks);
                pending_blanks.clear();
                quoted = !quoted;
                started = true;
            }
            c if quoted => value.push(c),
            c if is_blank(c) => {
                if started {
                    pending_blanks.push(c);
                }
            }
            ';' | '#' => break,
            c => {
                value.push_str(&pending_blanks);
                pending_blanks.clear();
                value.push(c);
                started = true;
            }
        }
    }

    ensure!(!quoted, UnterminatedQuoteSnafu { variable });
    Ok(value)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;

    fn section(name: &str, subsection: Option<&str>, variables: &[(&str, &str)]) -> Section {
        Section {
            name: name.to_owned(),
            subsection: subsection.map(ToOwned::to_owned),
            variables: variables
                .iter()
                .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
                .collect(),
        }
    }

    #[test]
    fn parse_document() {
        let sections = parse(indoc! {r#"
            ; leading comment
            [Global]
            user = "user"
              insecure-flag = true

            [VirtualCenter "10.0.0.1"]
            	thumbprint = AA:BB
            [Workspace]
        "#})
        .unwrap();

        assert_eq!(
            sections,
            vec![
                section(
                    "Global",
                    None,
                    &[("user", "user"), ("insecure-flag", "true")]
                ),
                section("VirtualCenter", Some("10.0.0.1"), &[("thumbprint", "AA:BB")]),
                section("Workspace", None, &[]),
            ]
        );
    }

    #[test]
    fn parse_repeated_sections() {
        let sections = parse(indoc! {r#"
            [VirtualCenter "a"]
            user = "first"
            [VirtualCenter "a"]
            user = "second"
        "#})
        .unwrap();

        assert_eq!(
            sections,
            vec![
                section("VirtualCenter", Some("a"), &[("user", "first")]),
                section("VirtualCenter", Some("a"), &[("user", "second")]),
            ]
        );
    }

    #[rstest]
    #[case(r#""0.0.0.0""#, "0.0.0.0")]
    #[case("0.0.0.0", "0.0.0.0")]
    #[case("  0.0.0.0   ", "0.0.0.0")]
    #[case(r#"" padded ""#, " padded ")]
    #[case("two  words ; comment", "two  words")]
    #[case(r#""semi;colon#hash""#, "semi;colon#hash")]
    #[case(r#"con"cat"enated"#, "concatenated")]
    #[case(r#""pass\\word""#, r"pass\word")]
    #[case(r#""pass\"word""#, "pass\"word")]
    #[case(r#""pass\tword""#, "pass\tword")]
    #[case(r"pass\tword", "pass\tword")]
    #[case(r#""""#, "")]
    #[case("", "")]
    #[case("\"€Пассворд密码🌟\"", "€Пассворд密码🌟")]
    fn parse_values(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(parse_value("key", raw).unwrap(), expected);
    }

    #[rstest]
    #[case(
        r#""pass\nword""#,
        ParseError::InvalidEscape { context: r#"variable "key""#.to_owned(), found: 'n' }
    )]
    #[case(r"pass\", ParseError::DanglingEscape { context: r#"variable "key""#.to_owned() })]
    #[case(r#""unterminated"#, ParseError::UnterminatedQuote { variable: "key".to_owned() })]
    fn parse_values_fail(#[case] raw: &str, #[case] expected: ParseError) {
        assert_eq!(parse_value("key", raw).unwrap_err(), expected);
    }

    #[test]
    fn parse_value_through_document() {
        let sections = parse("[Global]\npassword = \"pass\\\\word\" ; comment\n").unwrap();
        assert_eq!(sections, vec![section("Global", None, &[("password", r"pass\word")])]);
    }

    #[rstest]
    #[case(r#"VirtualCenter "a\"b\\c""#, "VirtualCenter", Some(r#"a"b\c"#))]
    #[case("Workspace", "Workspace", None)]
    #[case(r#"VirtualCenter """#, "VirtualCenter", Some(""))]
    #[case(r#"VirtualCenter   "1.1.1.1"  "#, "VirtualCenter", Some("1.1.1.1"))]
    fn parse_section_headers(
        #[case] header: &str,
        #[case] name: &str,
        #[case] subsection: Option<&str>,
    ) {
        assert_eq!(
            parse_section_header(header).unwrap(),
            (name.to_owned(), subsection.map(ToOwned::to_owned))
        );
    }

    #[rstest]
    #[case("", ParseError::InvalidSectionHeader { header: "".to_owned() })]
    #[case("Global x", ParseError::InvalidSectionHeader { header: "Global x".to_owned() })]
    #[case(
        r#"VirtualCenter "a" b"#,
        ParseError::InvalidSectionHeader { header: r#"VirtualCenter "a" b"#.to_owned() }
    )]
    #[case(
        r#"VirtualCenter "abc"#,
        ParseError::UnterminatedSubsection { header: r#"VirtualCenter "abc"#.to_owned() }
    )]
    #[case(
        r#"VirtualCenter "a\b""#,
        ParseError::InvalidEscape {
            context: r#"section header "VirtualCenter \"a\\b\"""#.to_owned(),
            found: 'b',
        }
    )]
    fn parse_section_headers_fail(#[case] header: &str, #[case] expected: ParseError) {
        assert_eq!(parse_section_header(header).unwrap_err(), expected);
    }

    #[rstest]
    #[case("user = \"user\"", ParseError::VariableOutsideSection { name: "user".to_owned() })]
    #[case("[Global]\n1user = x", ParseError::InvalidVariableName { name: "1user".to_owned() })]
    #[case("[Global]\n_user = x", ParseError::InvalidVariableName { name: "_user".to_owned() })]
    #[case("[Global]\nsecret name = x", ParseError::InvalidVariableName { name: "secret name".to_owned() })]
    #[case("[Global]\npassword = \"a\\b\"", ParseError::InvalidEscape {
        context: r#"variable "password""#.to_owned(),
        found: 'b',
    })]
    fn parse_fail(#[case] input: &str, #[case] expected: ParseError) {
        assert_eq!(parse(input).unwrap_err(), expected);
    }

    #[test]
    fn parse_syntax_error() {
        assert!(matches!(
            parse("[Global]\n= value\n"),
            Err(ParseError::Syntax { .. })
        ));
    }
}
