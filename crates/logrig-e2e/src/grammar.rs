//! Parser for the configuration subset the stand-in daemon understands.
//!
//! The accepted language is the one `logrig` renders: an `@version:` header,
//! an optional `options { ... };` block, `source`/`destination` blocks each
//! holding one driver call, and `log { ... };` blocks referencing statements
//! by identifier. `#` starts a comment running to the end of the line.

use std::collections::BTreeMap;

use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, take_till, take_while1};
use nom::character::complete::{anychar, char, multispace1};
use nom::combinator::{cut, map, not, opt, peek, recognize, value, verify};
use nom::error::ErrorKind;
use nom::multi::{fold_many0, many0, many0_count, separated_list0};
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::{IResult, Parser};
use thiserror::Error;

/// One driver call, e.g. `file("/tmp/in.log" flags(no-parse))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverDecl {
    /// Driver name.
    pub driver: String,
    /// Leading bare argument, when present.
    pub positional: Option<String>,
    /// Named options; multi-word values are joined with single spaces.
    pub options: BTreeMap<String, String>,
}

impl DriverDecl {
    /// Value of `key`, or the positional argument when `key` is absent.
    #[must_use]
    pub fn option_or_positional(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .map(String::as_str)
            .or(self.positional.as_deref())
    }
}

/// A `log { ... };` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogDecl {
    /// Referenced sources in order.
    pub sources: Vec<String>,
    /// Referenced destinations in order.
    pub destinations: Vec<String>,
}

/// A parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StubConfig {
    /// Value of the `@version:` header.
    pub version: Option<String>,
    /// Global options.
    pub options: BTreeMap<String, String>,
    /// Source statements by identifier.
    pub sources: BTreeMap<String, DriverDecl>,
    /// Destination statements by identifier.
    pub destinations: BTreeMap<String, DriverDecl>,
    /// Log paths in file order.
    pub logs: Vec<LogDecl>,
}

/// Errors raised while parsing a configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The input ended in the middle of a construct.
    #[error("unexpected end of configuration; expected {expected}")]
    UnexpectedEnd {
        /// What the parser was looking for.
        expected: &'static str,
    },
    /// A token did not fit the grammar.
    #[error("line {line}: unexpected '{found}'; expected {expected}")]
    Unexpected {
        /// One-based line number.
        line: usize,
        /// Offending token text.
        found: String,
        /// What the parser was looking for.
        expected: &'static str,
    },
    /// A quoted string was not closed.
    #[error("line {line}: unterminated string")]
    UnterminatedString {
        /// Line where the string started.
        line: usize,
    },
    /// A statement identifier was declared twice.
    #[error("duplicate {kind} '{id}'")]
    Duplicate {
        /// `source` or `destination`.
        kind: &'static str,
        /// Repeated identifier.
        id: String,
    },
    /// A log path references an undeclared statement.
    #[error("log path references unknown {kind} '{id}'")]
    UnknownReference {
        /// `source` or `destination`.
        kind: &'static str,
        /// Missing identifier.
        id: String,
    },
}

/// Where and why a combinator gave up.
#[derive(Debug)]
struct Syntax<'a> {
    at: &'a str,
    expected: &'static str,
    unterminated: bool,
}

impl<'a> nom::error::ParseError<&'a str> for Syntax<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        Self {
            at: input,
            expected: "valid syntax",
            unterminated: false,
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type PResult<'a, O> = IResult<&'a str, O, Syntax<'a>>;

enum Item {
    Version(String),
    Options(Vec<(String, String)>),
    Source(String, DriverDecl),
    Destination(String, DriverDecl),
    Log(LogDecl),
}

enum Fragment<'a> {
    Literal(&'a str),
    Escaped(char),
}

/// Parses `text` and checks every log path reference.
///
/// # Errors
///
/// Returns [`ParseError`] describing the first problem found.
pub fn parse(text: &str) -> Result<StubConfig, ParseError> {
    let mut config = StubConfig::default();
    let mut rest = skip_blank(text);
    while !rest.is_empty() {
        let (remaining, parsed) = item(rest).map_err(|error| locate(text, error))?;
        match parsed {
            Item::Version(version) => config.version = Some(version),
            Item::Options(options) => config.options.extend(options),
            Item::Source(id, decl) => insert_unique(&mut config.sources, "source", id, decl)?,
            Item::Destination(id, decl) => {
                insert_unique(&mut config.destinations, "destination", id, decl)?;
            }
            Item::Log(log) => config.logs.push(log),
        }
        rest = skip_blank(remaining);
    }
    check_references(&config)?;
    Ok(config)
}

fn insert_unique(
    table: &mut BTreeMap<String, DriverDecl>,
    kind: &'static str,
    id: String,
    decl: DriverDecl,
) -> Result<(), ParseError> {
    if table.contains_key(&id) {
        return Err(ParseError::Duplicate { kind, id });
    }
    table.insert(id, decl);
    Ok(())
}

fn check_references(config: &StubConfig) -> Result<(), ParseError> {
    for log in &config.logs {
        for (ids, table, kind) in [
            (&log.sources, &config.sources, "source"),
            (&log.destinations, &config.destinations, "destination"),
        ] {
            if let Some(missing) = ids.iter().find(|id| !table.contains_key(*id)) {
                return Err(ParseError::UnknownReference {
                    kind,
                    id: missing.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Turns a combinator failure into a [`ParseError`] with a line number.
fn locate(text: &str, error: nom::Err<Syntax<'_>>) -> ParseError {
    let syntax = match error {
        nom::Err::Error(syntax) | nom::Err::Failure(syntax) => syntax,
        nom::Err::Incomplete(_) => {
            return ParseError::UnexpectedEnd {
                expected: "more input",
            };
        }
    };
    let at = skip_blank(syntax.at);
    let offset = text.len().saturating_sub(at.len());
    let line = text.bytes().take(offset).filter(|byte| *byte == b'\n').count() + 1;
    if syntax.unterminated {
        return ParseError::UnterminatedString { line };
    }
    let found = word(at).map_or_else(
        |_| at.chars().next().map(String::from),
        |(_, token)| Some(token.to_owned()),
    );
    found.map_or(
        ParseError::UnexpectedEnd {
            expected: syntax.expected,
        },
        |token| ParseError::Unexpected {
            line,
            found: token,
            expected: syntax.expected,
        },
    )
}

fn skip_blank(input: &str) -> &str {
    blank(input).map_or(input, |(rest, ())| rest)
}

/// Relabels a recoverable error with what was expected at `input`.
fn expect<'a, O>(
    expected: &'static str,
    mut parser: impl Parser<&'a str, Output = O, Error = Syntax<'a>>,
) -> impl FnMut(&'a str) -> PResult<'a, O> {
    move |input| match parser.parse(input) {
        Err(nom::Err::Error(_)) => Err(nom::Err::Error(Syntax {
            at: input,
            expected,
            unterminated: false,
        })),
        other => other,
    }
}

/// Whitespace and `#` comments.
fn blank(input: &str) -> PResult<'_, ()> {
    value(
        (),
        many0_count(alt((
            multispace1,
            recognize(pair(char('#'), take_till(|c: char| c == '\n'))),
        ))),
    )
    .parse(input)
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !"(){};\"#".contains(c)
}

fn word(input: &str) -> PResult<'_, &str> {
    preceded(blank, take_while1(is_word_char)).parse(input)
}

fn keyword<'a>(name: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = Syntax<'a>> {
    verify(word, move |found: &str| found == name)
}

fn symbol<'a>(
    expected_char: char,
    expected: &'static str,
) -> impl FnMut(&'a str) -> PResult<'a, char> {
    expect(expected, preceded(blank, char(expected_char)))
}

const fn unescape(escaped: char) -> char {
    match escaped {
        'n' => '\n',
        't' => '\t',
        other => other,
    }
}

/// A double-quoted string with backslash escapes, as `OptionValue` renders.
fn quoted(input: &str) -> PResult<'_, String> {
    let (at_quote, ()) = blank(input)?;
    let (body, _) = char::<_, Syntax<'_>>('"').parse(at_quote)?;
    let fragment = alt((
        map(is_not("\\\""), Fragment::Literal),
        map(preceded(char('\\'), anychar), Fragment::Escaped),
    ));
    let collected = fold_many0(fragment, String::new, |mut text, piece| {
        match piece {
            Fragment::Literal(literal) => text.push_str(literal),
            Fragment::Escaped(escaped) => text.push(unescape(escaped)),
        }
        text
    });
    terminated(collected, char('"'))
        .parse(body)
        .map_err(|_: nom::Err<Syntax<'_>>| {
            nom::Err::Failure(Syntax {
                at: at_quote,
                expected: "a closing quote",
                unterminated: true,
            })
        })
}

fn argument(input: &str) -> PResult<'_, String> {
    alt((quoted, map(word, str::to_owned))).parse(input)
}

/// `(value value ...)`; multi-word values are joined with single spaces.
fn values(input: &str) -> PResult<'_, String> {
    preceded(
        symbol('(', "'('"),
        cut(terminated(
            separated_list0(multispace1, argument),
            symbol(')', "an option value"),
        )),
    )
    .map(|parts| parts.join(" "))
    .parse(input)
}

fn named_option(input: &str) -> PResult<'_, (String, String)> {
    pair(map(word, str::to_owned), values).parse(input)
}

fn positional(input: &str) -> PResult<'_, String> {
    alt((
        quoted,
        map(terminated(word, not(peek(preceded(blank, char('('))))), str::to_owned),
    ))
    .parse(input)
}

fn driver_call(input: &str) -> PResult<'_, DriverDecl> {
    let (rest, (driver, _, leading, options, _)) = (
        expect("a driver name", word),
        symbol('(', "'('"),
        opt(positional),
        many0(named_option),
        symbol(')', "a driver argument"),
    )
        .parse(input)?;
    Ok((
        rest,
        DriverDecl {
            driver: driver.to_owned(),
            positional: leading,
            options: options.into_iter().collect(),
        },
    ))
}

/// `<id> { <driver>(...); };`
fn statement(input: &str) -> PResult<'_, (String, DriverDecl)> {
    let (rest, (id, _, decl, _, _, _)) = (
        expect("a statement identifier", word),
        symbol('{', "'{'"),
        driver_call,
        symbol(';', "';'"),
        symbol('}', "'}'"),
        symbol(';', "';'"),
    )
        .parse(input)?;
    Ok((rest, (id.to_owned(), decl)))
}

fn options_body(input: &str) -> PResult<'_, Vec<(String, String)>> {
    let entry = pair(
        map(word, str::to_owned),
        cut(terminated(values, symbol(';', "';'"))),
    );
    delimited(
        symbol('{', "'{'"),
        many0(entry),
        pair(symbol('}', "an option name or '}'"), symbol(';', "';'")),
    )
    .parse(input)
}

fn log_body(input: &str) -> PResult<'_, LogDecl> {
    let reference = pair(
        alt((keyword("source"), keyword("destination"))),
        cut(delimited(
            symbol('(', "'('"),
            expect("a statement identifier", word),
            pair(symbol(')', "')'"), symbol(';', "';'")),
        )),
    );
    delimited(
        symbol('{', "'{'"),
        many0(reference),
        pair(
            symbol('}', "source, destination or '}'"),
            symbol(';', "';'"),
        ),
    )
    .map(|references| {
        let mut log = LogDecl::default();
        for (slot, id) in references {
            let ids = if slot == "source" {
                &mut log.sources
            } else {
                &mut log.destinations
            };
            ids.push(id.to_owned());
        }
        log
    })
    .parse(input)
}

fn version(input: &str) -> PResult<'_, String> {
    preceded(
        pair(blank, tag("@version:")),
        take_till(|c: char| c == '\n'),
    )
    .map(|text: &str| text.trim().to_owned())
    .parse(input)
}

fn item(input: &str) -> PResult<'_, Item> {
    expect(
        "options, source, destination or log",
        alt((
            map(version, Item::Version),
            map(preceded(keyword("options"), cut(options_body)), Item::Options),
            map(preceded(keyword("source"), cut(statement)), |(id, decl)| {
                Item::Source(id, decl)
            }),
            map(preceded(keyword("destination"), cut(statement)), |(id, decl)| {
                Item::Destination(id, decl)
            }),
            map(preceded(keyword("log"), cut(log_body)), Item::Log),
        )),
    )(input)
}
