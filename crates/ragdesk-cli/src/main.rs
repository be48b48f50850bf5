// ragdesk CLI entry point

use ragdesk_cli::logging::VerbosityLevel;
use ragdesk_cli::{output, router::CommandRouter};

#[tokio::main]
async fn main() {
    if let Err(e) = CommandRouter::route().await {
        output::print_error(&e.user_message());
        if VerbosityLevel::current() == VerbosityLevel::Verbose {
            eprintln!("{}", e.technical_details());
        }
        std::process::exit(1);
    }
}
