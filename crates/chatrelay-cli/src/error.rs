use colored::Colorize;

pub fn handle_error(err: anyhow::Error) -> ! {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    let msg = format!("{err:#}").to_lowercase();

    if msg.contains("api key not found") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Set your API key with:");
        eprintln!("  {} export OPENAI_API_KEY=<value>", "$".dimmed());
        eprintln!("  or run offline with:");
        eprintln!("  {} chatrelay --provider echo chat", "$".dimmed());
    }

    if msg.contains("template not found") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  List available templates with:");
        eprintln!("  {} chatrelay templates list", "$".dimmed());
    }

    if msg.contains("token counting is not implemented") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!(
            "  Set memory.counting_model to gpt-3.5-turbo, gpt-3.5-turbo-0301, gpt-4 or estimate."
        );
    }

    if msg.contains("connection refused") || msg.contains("network") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Check your internet connection and try again.");
    }

    std::process::exit(1);
}
