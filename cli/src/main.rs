use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let code = verax_cli::run_main().await;
    ExitCode::from(code.clamp(0, 255) as u8)
}
