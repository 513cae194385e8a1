//! Structured logging setup and log-safe text.
//!
//! Logs go to stderr through `tracing-subscriber`; stdout is reserved for
//! the run summary. Text that originates upstream (names, error bodies,
//! URLs) must pass through [`sanitize`] before it is logged.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init(verbose: bool) {
    let default_directive = if verbose {
        "amber_sync=debug"
    } else {
        "amber_sync=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_target(false)
        .try_init();
}

/// Remove control characters and terminal escape sequences.
///
/// CSI (`ESC [ … final`), OSC (`ESC ] … BEL|ESC \`) and two-byte escapes are
/// dropped whole; every other control character except tab becomes a space.
/// The result is truncated to `MAX_LOG_CHARS` characters.
pub fn sanitize(text: &str) -> String {
    const MAX_LOG_CHARS: usize = 500;

    let mut out = String::with_capacity(text.len().min(MAX_LOG_CHARS));
    let mut chars = text.chars().peekable();
    let mut kept = 0usize;

    while let Some(c) = chars.next() {
        if kept >= MAX_LOG_CHARS {
            out.push('…');
            break;
        }
        match c {
            '\u{1b}' => match chars.next() {
                Some('[') => {
                    // CSI: parameters and intermediates, then one final byte in @..~
                    for n in chars.by_ref() {
                        if ('@'..='~').contains(&n) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    while let Some(n) = chars.next() {
                        if n == '\u{7}' {
                            break;
                        }
                        if n == '\u{1b}' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            },
            // C1 CSI
            '\u{9b}' => {
                for n in chars.by_ref() {
                    if ('@'..='~').contains(&n) {
                        break;
                    }
                }
            }
            '\t' => {
                out.push('\t');
                kept += 1;
            }
            c if c.is_control() => {
                out.push(' ');
                kept += 1;
            }
            c => {
                out.push(c);
                kept += 1;
            }
        }
    }

    out
}
