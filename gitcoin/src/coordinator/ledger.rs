//! The contribution ledger, a plain-text file of `name: count` lines.

use std::io;
use std::path::Path;

/// Credit `username` once in the ledger text and return the new text.
///
/// A line belongs to a user when the text before its last `:` equals the
/// name exactly. Every such line has its count incremented; a line whose
/// count does not parse is left as it was. All other lines, including ones
/// without a `:`, are kept verbatim. A user with no line gets `name: 1`
/// appended.
pub fn credit(contents: &str, username: &str) -> String {
    let mut output = String::with_capacity(contents.len() + username.len() + 4);
    let mut found = false;

    for line in contents.split_inclusive('\n') {
        let credited = line
            .trim_end_matches('\n')
            .rsplit_once(':')
            .filter(|(user, _)| *user == username)
            .and_then(|(_, count)| count.trim().parse::<u64>().ok());

        match credited {
            Some(count) => {
                output.push_str(&format!("{}: {}\n", username, count + 1));
                found = true;
            }
            None => output.push_str(line),
        }
    }

    if !found {
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(&format!("{}: 1\n", username));
    }
    output
}

/// Apply [`credit`] to the ledger file at `path`. A missing file is treated
/// as an empty ledger.
pub async fn credit_file(path: &Path, username: &str) -> io::Result<()> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    tokio::fs::write(path, credit(&contents, username)).await
}
