//! Bot-driven demo race: opens a room, fills it with bot runners and races
//! them to the finish line, with a display observer logging progress.

use clap::Parser;
use engine::{RaceError, RaceService};
use log::{debug, info, warn};
use rand::Rng;
use shared::{RaceStatus, StepKind, DISTANCE_OPTIONS, MAX_STEP, MIN_STEP};
use std::time::Duration;
use store::Store;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of bot runners in the race
    #[arg(short = 'r', long, default_value = "4")]
    runners: u32,

    /// Finish distance (one of 100, 500, 1000)
    #[arg(short = 'd', long, default_value = "100")]
    distance: u32,

    /// Average milliseconds between bot steps
    #[arg(short = 's', long, default_value = "120")]
    step_interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    if args.runners == 0 {
        return Err("need at least one runner".into());
    }
    if !DISTANCE_OPTIONS.contains(&args.distance) {
        return Err(format!(
            "distance must be one of {:?}, got {}",
            DISTANCE_OPTIONS, args.distance
        )
        .into());
    }

    let service = RaceService::new(Store::new());
    let _sweeper = service.spawn_sweeper();

    let session = service.create_room(args.distance)?;
    let race_id = session.id.clone();
    info!(
        "room {} opened: {}m sprint, {} runners",
        race_id, args.distance, args.runners
    );

    for i in 1..=args.runners {
        service.join_room(&race_id, &format!("runner-{}", i), &format!("Runner {}", i))?;
    }

    // Display observer: logs every (coalesced) state change it sees
    let mut watcher = service.watch(&race_id);
    let display = tokio::spawn(async move {
        while watcher.changed().await.is_ok() {
            let Some(snapshot) = watcher.snapshot() else {
                break;
            };
            let lanes: Vec<String> = snapshot
                .participants
                .iter()
                .map(|p| match p.rank {
                    Some(rank) => format!("{} {}m #{}", p.nickname, p.position, rank),
                    None => format!("{} {}m", p.nickname, p.position),
                })
                .collect();
            info!("[{}] {}", snapshot.session.status, lanes.join(" | "));
            if snapshot.session.status.is_terminal() {
                break;
            }
        }
    });

    service.start_countdown(&race_id)?;
    let _deadline_watcher = service.spawn_countdown_watcher(&race_id);
    info!(
        "countdown running: {}ms to the start",
        service.countdown_remaining_ms(&race_id)?
    );

    let mut bots = Vec::new();
    for i in 1..=args.runners {
        let service = service.clone();
        let race_id = race_id.clone();
        let user_id = format!("runner-{}", i);
        let base_interval = args.step_interval;

        bots.push(tokio::spawn(async move {
            loop {
                let (pause, step_value) = {
                    let mut rng = rand::thread_rng();
                    (
                        rng.gen_range(base_interval / 2..=base_interval + base_interval / 2),
                        rng.gen_range(MIN_STEP..=MAX_STEP),
                    )
                };
                tokio::time::sleep(Duration::from_millis(pause)).await;

                match service.submit_step(&race_id, &user_id, step_value) {
                    Ok(step) => {
                        match step.kind {
                            StepKind::Dash => debug!("{} dashes!", user_id),
                            StepKind::Boost => debug!("{} boosts!", user_id),
                            StepKind::Plain => {}
                        }
                        if step.rank.is_some() {
                            return;
                        }
                    }
                    // Not started yet: keep pacing until the gun goes off
                    Err(RaceError::InvalidState {
                        status: RaceStatus::Waiting | RaceStatus::Countdown,
                    }) => {}
                    // Race over (everyone ranked or force-finished)
                    Err(RaceError::InvalidState { .. }) => return,
                    Err(RaceError::ContendedWrite(err)) => {
                        debug!("{}: {} (stepping again)", user_id, err);
                    }
                    Err(err) => {
                        warn!("{} dropped out: {}", user_id, err);
                        return;
                    }
                }
            }
        }));
    }

    for bot in bots {
        bot.await?;
    }
    display.await?;

    let mut standings = service.participants(&race_id)?;
    standings.sort_by_key(|p| p.rank.unwrap_or(u32::MAX));
    info!("final standings:");
    for p in &standings {
        match p.rank {
            Some(rank) => info!("  #{} {} ({}m)", rank, p.nickname, p.position),
            None => info!("  -- {} ({}m)", p.nickname, p.position),
        }
    }

    Ok(())
}
