use clap::Parser;
use swarmctl::{interactive, oneshot, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Completions { shell }) => {
            swarmctl::completions::generate(shell);
            Ok(())
        }
        Some(command) => oneshot::dispatch(&cli.server, &cli.token, &cli.project, command).await,
        None => interactive::run(&cli.server, &cli.token, &cli.project).await,
    }
}
