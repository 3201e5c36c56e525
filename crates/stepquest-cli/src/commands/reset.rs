use clap::Args;

use super::open_journal;

#[derive(Args)]
pub struct ResetArgs {
    /// Confirm the deletion
    #[arg(long)]
    yes: bool,
}

pub fn run(args: ResetArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.yes {
        return Err("refusing to delete progress without --yes".into());
    }
    let journal = open_journal()?;
    journal.clear_all()?;
    println!("lifetime stats and mission history deleted");
    Ok(())
}
