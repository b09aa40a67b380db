use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = armaserver_lib::Cli::parse();
    let code = armaserver_lib::run(cli).await;
    std::process::exit(code);
}
