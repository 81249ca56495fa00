//! Job command parser
//!
//! Built with nom combinators over `&str`.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1, space0, space1},
    combinator::{all_consuming, map, map_res, value, verify},
    multi::{many1, separated_list1},
    sequence::{delimited, preceded, separated_pair, terminated, tuple},
    IResult,
};

use crate::error::{KvsError, Result};
use crate::protocol::MAX_STRING_SIZE;

use super::{JobCommand, MAX_WRITE_SIZE};

/// Parse one job-file line. Never fails: bad lines become
/// [`JobCommand::Invalid`].
pub fn parse_line(line: &str) -> JobCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return JobCommand::Empty;
    }
    parse_command(trimmed).unwrap_or_else(|_| JobCommand::Invalid(trimmed.to_string()))
}

/// Parse a single command
pub fn parse_command(input: &str) -> Result<JobCommand> {
    let (_, command) = all_consuming(terminated(command_parser, space0))(input)
        .map_err(|e| KvsError::Parse(format!("{:?}", e)))?;
    Ok(command)
}

fn command_parser(input: &str) -> IResult<&str, JobCommand> {
    alt((
        write_command,
        read_command,
        delete_command,
        wait_command,
        value(JobCommand::Show, tag("SHOW")),
        value(JobCommand::Backup, tag("BACKUP")),
        value(JobCommand::Help, tag("HELP")),
    ))(input)
}

/// Surround a parser with optional blanks
fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(space0, inner, space0)
}

/// A key or value: no brackets, parens, commas or blanks, at most
/// `MAX_STRING_SIZE` bytes
fn field(input: &str) -> IResult<&str, &str> {
    verify(
        take_while1(|c: char| !matches!(c, '[' | ']' | '(' | ')' | ',') && !c.is_whitespace()),
        |s: &str| s.len() <= MAX_STRING_SIZE,
    )(input)
}

/// `(key,value)`
fn pair(input: &str) -> IResult<&str, (&str, &str)> {
    delimited(
        char('('),
        separated_pair(ws(field), char(','), ws(field)),
        char(')'),
    )(input)
}

/// `[key,key2,...]`
fn key_list(input: &str) -> IResult<&str, Vec<String>> {
    map(
        delimited(
            char('['),
            verify(separated_list1(char(','), ws(field)), |keys: &Vec<&str>| {
                keys.len() <= MAX_WRITE_SIZE
            }),
            char(']'),
        ),
        |keys| keys.into_iter().map(str::to_string).collect(),
    )(input)
}

/// WRITE [(k,v)(k2,v2)...]
fn write_command(input: &str) -> IResult<&str, JobCommand> {
    map(
        preceded(
            tuple((tag("WRITE"), space1)),
            delimited(
                char('['),
                verify(many1(ws(pair)), |pairs: &Vec<(&str, &str)>| {
                    pairs.len() <= MAX_WRITE_SIZE
                }),
                char(']'),
            ),
        ),
        |pairs| {
            JobCommand::Write(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
        },
    )(input)
}

/// READ [k,k2,...]
fn read_command(input: &str) -> IResult<&str, JobCommand> {
    map(preceded(tuple((tag("READ"), space1)), key_list), JobCommand::Read)(input)
}

/// DELETE [k,k2,...]
fn delete_command(input: &str) -> IResult<&str, JobCommand> {
    map(preceded(tuple((tag("DELETE"), space1)), key_list), JobCommand::Delete)(input)
}

/// WAIT <delay_ms>
fn wait_command(input: &str) -> IResult<&str, JobCommand> {
    map(
        preceded(tuple((tag("WAIT"), space1)), map_res(digit1, str::parse::<u64>)),
        JobCommand::Wait,
    )(input)
}
