mod app;
mod cli;

fn main() -> anyhow::Result<()> {
    cli::run()
}
