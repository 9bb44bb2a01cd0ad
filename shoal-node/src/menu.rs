//! Indexed selection menus for the interactive session.

use std::io::{self, Write};

/// Print an indexed table of entries.
pub fn print_indexed(title: &str, entries: &[String]) {
    println!("\n{title}\n");
    println!("{:<8}{:<24}", "Index", "Name");
    for (i, entry) in entries.iter().enumerate() {
        println!("{i:<8}{entry:<24}");
    }
}

/// Read one index from stdin, re-prompting until it is within bounds.
pub fn select_index(len: usize) -> io::Result<usize> {
    loop {
        let line = prompt()?;
        match line.trim().parse::<usize>() {
            Ok(i) if i < len => return Ok(i),
            _ => println!("Enter an index between 0 and {}", len - 1),
        }
    }
}

/// Read a comma-separated batch of indices. Invalid entries are reported and
/// skipped; re-prompts until at least one valid index is picked.
pub fn select_indices(len: usize) -> io::Result<Vec<usize>> {
    loop {
        let line = prompt()?;
        let (picked, rejected) = parse_selection(&line, len);
        for bad in &rejected {
            println!("Index {bad} not found!");
        }
        if !picked.is_empty() {
            return Ok(picked);
        }
        println!("Pick at least one index between 0 and {}", len - 1);
    }
}

/// Parse a comma-separated index list against `len` entries.
/// Returns the valid indices (deduplicated, input order) and the rejected parts.
fn parse_selection(line: &str, len: usize) -> (Vec<usize>, Vec<String>) {
    let mut picked = Vec::new();
    let mut rejected = Vec::new();
    for part in line.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.parse::<usize>() {
            Ok(i) if i < len => {
                if !picked.contains(&i) {
                    picked.push(i);
                }
            }
            _ => rejected.push(part.to_string()),
        }
    }
    (picked, rejected)
}

fn prompt() -> io::Result<String> {
    print!("> ");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stdin closed",
        ));
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_index() {
        assert_eq!(parse_selection("2", 5), (vec![2], vec![]));
    }

    #[test]
    fn comma_separated_batch() {
        let (picked, rejected) = parse_selection("0, 3,1", 5);
        assert_eq!(picked, vec![0, 3, 1]);
        assert!(rejected.is_empty());
    }

    #[test]
    fn out_of_bounds_and_junk_rejected() {
        let (picked, rejected) = parse_selection("1, 9, x", 5);
        assert_eq!(picked, vec![1]);
        assert_eq!(rejected, vec!["9".to_string(), "x".to_string()]);
    }

    #[test]
    fn duplicates_collapse() {
        let (picked, _) = parse_selection("1,1,2", 5);
        assert_eq!(picked, vec![1, 2]);
    }

    #[test]
    fn empty_line_picks_nothing() {
        let (picked, rejected) = parse_selection("  ", 5);
        assert!(picked.is_empty());
        assert!(rejected.is_empty());
    }
}
