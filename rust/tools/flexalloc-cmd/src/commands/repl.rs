use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};
use flexalloc_buffer::GrowableBuffer;
use flexalloc_page_alloc::RawAllocator;

const PROMPT: &str =
    "Enter 'add <value>' to add an element, 'print' to display the array, or 'exit' to quit: ";

/// A single line of REPL input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Add(i32),
    Print,
    Exit,
}

/// Parses one line of REPL input.
///
/// Only the first two whitespace-separated words are looked at. A numeric
/// second word is accepted only after `add`; any other second word is ignored,
/// so a bare `add` or `add abc` appends `0`. Errors carry the message shown to
/// the user.
pub fn parse_command(line: &str) -> Result<ReplCommand> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        bail!("Unknown command. Please try again.");
    };
    let value = parts.next().and_then(|word| word.parse::<i32>().ok());

    match (command, value) {
        ("add", Some(value)) => Ok(ReplCommand::Add(value)),
        (_, Some(_)) => bail!("Invalid command format. Please use 'add <value>'."),
        ("add", None) => Ok(ReplCommand::Add(0)),
        ("print", None) => Ok(ReplCommand::Print),
        ("exit", None) => Ok(ReplCommand::Exit),
        (_, None) => bail!("Unknown command. Please try again."),
    }
}

pub fn run(initial_capacity: usize, alignment: usize) -> Result<()> {
    let mut buffer = GrowableBuffer::<i32>::new(initial_capacity, alignment)
        .context("Failed to allocate initial memory")?;

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let res = run_session(&mut buffer, stdin.lock(), stdout.lock());
    buffer.destroy();
    res
}

/// Runs the read-eval-print loop until `exit` or end of input.
pub fn run_session<A, R, W>(
    buffer: &mut GrowableBuffer<i32, A>,
    mut input: R,
    mut output: W,
) -> Result<()>
where
    A: RawAllocator,
    R: BufRead,
    W: Write,
{
    let mut line = String::new();
    loop {
        write!(output, "{PROMPT}")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            break;
        }

        match parse_command(&line) {
            Ok(ReplCommand::Add(value)) => {
                if let Err(e) = buffer.append(value) {
                    log::debug!("append({value}) failed: {e}");
                    writeln!(output, "Failed to add element {value}")?;
                }
            }
            Ok(ReplCommand::Print) => print_buffer(buffer, &mut output)?,
            Ok(ReplCommand::Exit) => break,
            Err(e) => writeln!(output, "{e}")?,
        }
    }
    Ok(())
}

fn print_buffer<A, W>(buffer: &GrowableBuffer<i32, A>, output: &mut W) -> Result<()>
where
    A: RawAllocator,
    W: Write,
{
    writeln!(
        output,
        "Array size: {}, capacity: {}",
        buffer.len(),
        buffer.capacity()
    )?;
    for value in buffer.iter() {
        write!(output, "{value} ")?;
    }
    writeln!(output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("add 5").unwrap(), ReplCommand::Add(5));
        assert_eq!(parse_command("  add   -12\n").unwrap(), ReplCommand::Add(-12));
        assert_eq!(parse_command("print\n").unwrap(), ReplCommand::Print);
        assert_eq!(parse_command("exit").unwrap(), ReplCommand::Exit);
    }

    #[test]
    fn test_parse_command_missing_value_adds_zero() {
        assert_eq!(parse_command("add").unwrap(), ReplCommand::Add(0));
        assert_eq!(parse_command("add abc\n").unwrap(), ReplCommand::Add(0));
        assert_eq!(parse_command("add 99999999999").unwrap(), ReplCommand::Add(0));
        assert_eq!(parse_command("add 1 2").unwrap(), ReplCommand::Add(1));
        assert_eq!(parse_command("print all").unwrap(), ReplCommand::Print);
    }

    #[test]
    fn test_parse_command_errors() {
        let message = |line: &str| parse_command(line).unwrap_err().to_string();
        assert_eq!(message(""), "Unknown command. Please try again.");
        assert_eq!(message("frobnicate"), "Unknown command. Please try again.");
        assert_eq!(
            message("print 3"),
            "Invalid command format. Please use 'add <value>'."
        );
        assert_eq!(
            message("exit 0"),
            "Invalid command format. Please use 'add <value>'."
        );
    }

    #[test]
    fn test_session() {
        let mut buffer = GrowableBuffer::<i32>::new(4, 16).unwrap();
        let input = b"add 1\nadd 2\nadd 3\nadd 4\nadd 5\nbogus\nprint\nexit\nadd 6\n";
        let mut output = Vec::new();
        run_session(&mut buffer, &input[..], &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("Unknown command. Please try again."));
        assert!(output.contains("Array size: 5, capacity: 8\n1 2 3 4 5 \n"));
        assert_eq!(buffer.as_slice(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_session_bare_add_appends_zero() {
        let mut buffer = GrowableBuffer::<i32>::new(2, 8).unwrap();
        let mut output = Vec::new();
        let input = b"add 3\nadd\nadd x\nprint\nexit\n";
        run_session(&mut buffer, &input[..], &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("Array size: 3, capacity: 4\n3 0 0 \n"));
        assert_eq!(buffer.as_slice(), &[3, 0, 0]);
    }

    #[test]
    fn test_session_ends_at_eof() {
        let mut buffer = GrowableBuffer::<i32>::new(1, 4).unwrap();
        let mut output = Vec::new();
        run_session(&mut buffer, &b"add 7\n"[..], &mut output).unwrap();
        assert_eq!(buffer.as_slice(), &[7]);
    }
}
