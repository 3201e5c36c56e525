use std::sync::mpsc::Receiver;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local};
use clap::Args;
use stepquest_core::generation;
use stepquest_core::{
    Clock, Config, Event, LocationFix, ManualClock, QuestSession, ScanContext, SimulatedPedometer,
    Vibe,
};

use super::open_journal;

/// Steps walked per simulated minute.
const CHUNK: u64 = 100;
/// Upper bound on a generated step target.
const MAX_TARGET: u64 = 10_000;

#[derive(Args)]
pub struct SimulateArgs {
    /// Mission vibe to pick (chill, discovery, workout)
    #[arg(long)]
    vibe: Vibe,
    /// Steps to walk; defaults to the mission's target
    #[arg(long)]
    steps: Option<u64>,
    /// Where the walk takes place
    #[arg(long)]
    location: Option<String>,
    /// Print every event as a JSON line
    #[arg(long)]
    json: bool,
}

fn describe(event: &Event) -> Option<String> {
    let line = match event {
        Event::SensorStatusChanged { status, message, .. } => {
            format!("sensor {status:?}: {}", message.as_deref().unwrap_or(""))
        }
        Event::MissionsGenerated { mission_ids, .. } => {
            format!("{} missions offered", mission_ids.len())
        }
        Event::ScanFailed { message, .. } => format!("scan failed: {message}"),
        Event::MissionSelected {
            vibe, step_target, ..
        } => format!("started {} mission, target {step_target} steps", vibe.label()),
        Event::MissionProgress {
            steps_in_mission,
            progress,
            ..
        } => format!("{steps_in_mission} steps ({:.0}%)", progress * 100.0),
        Event::StepsSynced {
            delta, total_steps, ..
        } => format!("synced {delta} steps, lifetime {total_steps}"),
        Event::MissionCompleted {
            steps_completed, ..
        } => format!("mission complete after {steps_completed} steps"),
        Event::RewardReady {
            reward_text,
            persisted,
            ..
        } => {
            let saved = if *persisted { "" } else { " (not saved)" };
            format!("reward: {reward_text}{saved}")
        }
        _ => return None,
    };
    Some(line)
}

/// Start time for a walk of `steps` that stays within one local day.
fn start_time(steps: u64) -> DateTime<Local> {
    let now = Local::now();
    let walk = Duration::minutes((steps.min(1_000_000) / CHUNK + 1) as i64);
    if (now + walk).date_naive() == now.date_naive() {
        now
    } else {
        now - walk
    }
}

fn print_events(events: &Receiver<Event>, json: bool) -> Result<(), serde_json::Error> {
    for event in events.try_iter() {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else if let Some(line) = describe(&event) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn run(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let journal = open_journal()?;
    let text = generation::from_config(&config.generator)?;

    let clock = Arc::new(ManualClock::new(start_time(args.steps.unwrap_or(MAX_TARGET))));
    let pedometer = Arc::new(SimulatedPedometer::new(clock.clone()));
    let mut session = QuestSession::new(pedometer.clone(), clock.clone(), journal, text, &config)?;
    let events = session.subscribe();

    session.start()?;
    let scan = ScanContext {
        location_name: args.location,
    };
    let missions = session.scan(&scan)?;
    let mission = missions
        .iter()
        .find(|m| m.vibe == args.vibe)
        .ok_or_else(|| format!("no {} mission offered", args.vibe))?;
    if !args.json {
        println!("{}: {}", mission.title, mission.description);
    }
    session.select(&mission.id)?;
    print_events(&events, args.json)?;

    // Prime the live watch so its baseline is captured before walking.
    pedometer.walk(0);
    session.pump();

    let total = args.steps.unwrap_or(u64::from(mission.step_target));
    let degrees_per_chunk = CHUNK as f64 * config.mission.step_length_m / 111_320.0;
    let (mut latitude, longitude) = (35.6595, 139.7005);
    let mut walked = 0;
    while walked < total {
        let chunk = CHUNK.min(total - walked);
        walked += chunk;
        pedometer.walk(chunk);
        clock.advance(Duration::minutes(1));
        latitude += degrees_per_chunk;
        session.on_location(&LocationFix::new(
            latitude,
            longitude,
            clock.now().timestamp_millis(),
        ));
        session.tick();
        print_events(&events, args.json)?;
    }

    session.stop();
    print_events(&events, args.json)?;
    if !args.json {
        if let Some(active) = session.missions().active_mission() {
            if !active.is_completed {
                println!(
                    "stopped at {} of {} steps",
                    active.steps_in_mission(),
                    active.mission.step_target
                );
            }
        }
    }
    Ok(())
}
