use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

/// Password for `save` when none was given on the command line.
pub fn read_password(username: &str) -> Result<Zeroizing<String>> {
    //  stdin (Pipeline)
    //  printf "%s" "$NEW_PASSWORD" | credstore save alice
    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().lock().read_line(&mut buf)?;
        trim_newline(&mut buf);

        if !buf.is_empty() {
            return Ok(buf);
        }
        bail!("password cannot be empty");
    }

    //  interactive (TTY)
    let pw = Zeroizing::new(rpassword::prompt_password(format!(
        "Password for {username}: "
    ))?);
    if pw.is_empty() {
        bail!("password cannot be empty");
    }
    Ok(pw)
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
