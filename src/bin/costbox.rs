use anyhow::Result;

fn main() -> Result<()> {
    costbox::cli::run()
}
