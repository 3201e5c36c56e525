use clap::Args;

use super::open_journal;

#[derive(Args)]
pub struct HistoryArgs {
    /// Show at most this many missions
    #[arg(long)]
    limit: Option<usize>,
    /// Print the records as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: HistoryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let journal = open_journal()?;
    let mut history = journal.history()?;
    if let Some(limit) = args.limit {
        history.truncate(limit);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }
    if history.is_empty() {
        println!("no completed missions");
        return Ok(());
    }
    for mission in &history {
        println!(
            "{}  {:<10} {}",
            mission.completed_at.format("%Y-%m-%d %H:%M"),
            mission.vibe.label(),
            mission.title
        );
        println!(
            "    {} / {} steps, {} min, {:.2} km",
            mission.steps_completed,
            mission.step_target,
            mission.duration_minutes,
            mission.route_length_km()
        );
        println!("    {}", mission.reward_text);
    }
    Ok(())
}
