//! Literate source handling
//!
//! Source files are Markdown-ish text where only fenced blocks are code:
//!
//! ````text
//! Some prose, which is ignored.
//!
//! ~~~
//! 'Hello s:put nl
//! ~~~
//!
//! ```
//! #1 #2 + #3 eq? assert
//! ```
//! ````
//!
//! Test blocks are only evaluated when tests are enabled.

/// Tokens which open and close code and test blocks
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fences {
    /// Opens a code block
    pub code_start: String,
    /// Closes a code block
    pub code_end: String,
    /// Opens a test block
    pub test_start: String,
    /// Closes a test block
    pub test_end: String,
}

impl Default for Fences {
    fn default() -> Self {
        Self {
            code_start: "~~~".to_owned(),
            code_end: "~~~".to_owned(),
            test_start: "```".to_owned(),
            test_end: "```".to_owned(),
        }
    }
}

impl Fences {
    /// Checks whether `token` opens or closes a block that will be evaluated
    pub fn is_boundary(&self, token: &str, tests: bool) -> bool {
        token == self.code_start
            || token == self.code_end
            || (tests && (token == self.test_start || token == self.test_end))
    }

    /// Checks whether `token` opens a test block, evaluated or not
    pub fn is_test_start(&self, token: &str) -> bool {
        token == self.test_start
    }
}

/// Applies backspaces (8 or 127) typed into a token
pub fn clean(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\u{8}' | '\u{7f}' if !out.is_empty() => {
                out.pop();
            }
            c => out.push(c),
        }
    }
    out
}
