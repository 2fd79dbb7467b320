//! Terminal output helpers.

use colored::Colorize;

use apigate::{Message, MessageRole, Usage};

/// Prints the assistant header before streamed content.
pub fn assistant_header() {
    println!("\n{}", "Assistant".bright_magenta().bold());
}

/// Prints a warning line.
pub fn warning(message: &str) {
    eprintln!("{} {message}", "warning:".yellow().bold());
}

/// Prints the conversation so far with role coloring.
pub fn list_messages(messages: &[Message]) {
    println!("\n=== Conversation ===\n");
    for (idx, msg) in messages.iter().enumerate() {
        let (role, color_fn): (&str, fn(&str) -> colored::ColoredString) = match msg.role {
            MessageRole::System => ("System", |s: &str| s.bright_black()),
            MessageRole::User => ("User", |s: &str| s.bright_cyan()),
            MessageRole::Assistant => ("Assistant", |s: &str| s.bright_magenta()),
            MessageRole::Tool => ("Tool", |s: &str| s.bright_yellow()),
            _ => ("Unknown", |s: &str| s.white()),
        };
        println!("[{idx}] {}: {}", color_fn(role), msg.content);
    }
    println!();
}

/// Formats cumulative token usage for the prompt line.
#[must_use]
pub fn usage_summary(usage: &Usage) -> String {
    format!(
        "{}↑ {}↓ {}Σ",
        usage.prompt_tokens.to_string().cyan(),
        usage.completion_tokens.to_string().green(),
        usage.total_tokens.to_string().yellow()
    )
}
