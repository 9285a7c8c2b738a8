use std::process::ExitCode;

fn main() -> ExitCode {
    medchat_cli::run()
}
