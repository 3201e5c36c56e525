use clap::Args;

use super::open_journal;

#[derive(Args)]
pub struct StatsArgs {
    /// Print the raw stats record as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: StatsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let journal = open_journal()?;
    let stats = journal.stats()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("Total steps:   {}", stats.total_steps);
    println!("Missions:      {}", stats.total_missions);
    println!("Distance:      {:.2} km", stats.total_distance_km);
    println!("Last updated:  {}", stats.last_updated.format("%Y-%m-%d %H:%M UTC"));
    Ok(())
}
