use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_until, take_while1},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{map, map_res, opt, value},
    multi::separated_list0,
    sequence::{delimited, preceded, tuple},
    IResult,
};

use crate::table::PageSize;

#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    /// Reload entities from the backend.
    List,
    Tags,
    Page(usize),
    Next,
    Prev,
    Size(PageSize),
    Sort(String),
    /// `index` is the 1-based number shown in the `#` column.
    Pick { index: usize, shift: bool },
    PickAll,
    Clear,
    Show(String),
    Hide(String),
    Add { tag: String, entity: String },
    Remove { tag: String, entity: String },
    Sync { entity: String, tags: Vec<String> },
    /// Add a tag to every selected entity.
    Assign(String),
    Unassign(String),
    Help,
    Exit,
}

// --- BASIC PARSERS ---

fn parse_usize(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |s: &str| s.parse::<usize>())(input)
}

fn parse_quoted_string(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"')(input)?;
    let (input, content) = take_until("\"")(input)?;
    let (input, _) = char('"')(input)?;
    Ok((input, content.to_string()))
}

fn parse_ident(input: &str) -> IResult<&str, String> {
    map(
        take_while1(|c: char| c.is_alphanumeric() || c == '-' || c == '_'),
        |s: &str| s.to_string(),
    )(input)
}

/// Entity ids may be written bare or in single quotes.
fn parse_entity(input: &str) -> IResult<&str, String> {
    alt((delimited(char('\''), parse_ident, char('\'')), parse_ident))(input)
}

fn parse_tag_list(input: &str) -> IResult<&str, Vec<String>> {
    delimited(
        ws(char('[')),
        separated_list0(ws(char(',')), parse_quoted_string),
        ws(char(']')),
    )(input)
}

// --- HELPERS ---
fn ws<'a, F, O, E: nom::error::ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where F: FnMut(&'a str) -> IResult<&'a str, O, E> {
    delimited(multispace0, inner, multispace0)
}

fn tag_ci(t: &'static str) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input| tag_no_case(t)(input)
}

// --- COMMAND PARSERS ---

fn parse_navigation(input: &str) -> IResult<&str, Command> {
    alt((
        map(preceded(tuple((tag_ci("PAGE"), multispace1)), parse_usize), Command::Page),
        value(Command::Next, tag_ci("NEXT")),
        value(Command::Prev, alt((tag_ci("PREV"), tag_ci("BACK")))),
    ))(input)
}

fn parse_size(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("SIZE")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, size) = alt((
        value(PageSize::All, tag_ci("ALL")),
        map_res(digit1, |s: &str| s.parse::<PageSize>()),
    ))(input)?;
    Ok((input, Command::Size(size)))
}

fn parse_sort(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("SORT")(input)?;
    let (input, _) = opt(tuple((multispace1, tag_ci("BY"), multispace1)))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, column) = parse_ident(input)?;
    Ok((input, Command::Sort(column)))
}

fn parse_pick(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("PICK")(input)?;
    let (input, _) = multispace1(input)?;
    alt((
        value(Command::PickAll, tag_ci("ALL")),
        map(
            tuple((parse_usize, opt(preceded(multispace1, tag_ci("SHIFT"))))),
            |(index, shift)| Command::Pick { index, shift: shift.is_some() },
        ),
    ))(input)
}

fn parse_columns(input: &str) -> IResult<&str, Command> {
    alt((
        map(preceded(tuple((tag_ci("SHOW"), multispace1)), parse_ident), Command::Show),
        map(preceded(tuple((tag_ci("HIDE"), multispace1)), parse_ident), Command::Hide),
    ))(input)
}

fn parse_add(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("ADD")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, tag) = parse_quoted_string(input)?;
    let (input, _) = ws(tag_ci("TO"))(input)?;
    let (input, entity) = parse_entity(input)?;
    Ok((input, Command::Add { tag, entity }))
}

fn parse_remove(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("REMOVE")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, tag) = parse_quoted_string(input)?;
    let (input, _) = ws(tag_ci("FROM"))(input)?;
    let (input, entity) = parse_entity(input)?;
    Ok((input, Command::Remove { tag, entity }))
}

fn parse_sync(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("SYNC")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, entity) = parse_entity(input)?;
    let (input, tags) = parse_tag_list(input)?;
    Ok((input, Command::Sync { entity, tags }))
}

fn parse_bulk(input: &str) -> IResult<&str, Command> {
    alt((
        map(preceded(tuple((tag_ci("ASSIGN"), multispace1)), parse_quoted_string), Command::Assign),
        map(preceded(tuple((tag_ci("UNASSIGN"), multispace1)), parse_quoted_string), Command::Unassign),
    ))(input)
}

fn parse_simple(input: &str) -> IResult<&str, Command> {
    alt((
        value(Command::List, alt((tag_ci("LIST"), tag_ci("LS")))),
        value(Command::Tags, tag_ci("TAGS")),
        value(Command::Clear, tag_ci("CLEAR")),
        value(Command::Help, tag_ci("HELP")),
        value(Command::Exit, alt((tag_ci("EXIT"), tag_ci("QUIT")))),
    ))(input)
}

pub fn parse_command(input: &str) -> Result<Command, String> {
    let input = input.trim();
    let result = alt((
        parse_navigation,
        parse_size,
        parse_sort,
        parse_pick,
        parse_columns,
        parse_add,
        parse_remove,
        parse_sync,
        parse_bulk,
        parse_simple,
    ))(input);

    match result {
        Ok((remainder, cmd)) => {
            if !remainder.trim().is_empty() {
                return Err(format!("Unexpected tokens at end: '{}'", remainder));
            }
            Ok(cmd)
        },
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let context: String = e.input.chars().take(20).collect();
            if context.len() < e.input.len() {
                Err(format!("Invalid syntax near: '{}...'", context))
            } else {
                Err(format!("Invalid syntax near: '{}'", context))
            }
        },
        Err(nom::Err::Incomplete(_)) => Err("Incomplete command.".to_string()),
    }
}
