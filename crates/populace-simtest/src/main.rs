//! Populace Headless Simulation Harness
//!
//! Validates the population scheduler end-to-end without an engine behind
//! it. Runs entirely in-process — no rendering, no networking, just the
//! in-memory world host.
//!
//! Usage:
//!   cargo run -p populace-simtest
//!   cargo run -p populace-simtest -- --verbose

use populace_core::clock::{ActivityWindowClock, Tier, Transition};
use populace_core::config::TierCeilings;
use populace_core::headless::HeadlessWorld;
use populace_core::population::PopulationState;
use populace_core::prelude::*;
use populace_core::region::RegionRegistry;

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn check(results: &mut Vec<TestResult>, name: &str, passed: bool, detail: String) {
    results.push(TestResult {
        name: name.into(),
        passed,
        detail,
    });
}

fn main() {
    env_logger::init();
    let verbose = std::env::args().any(|a| a == "--verbose");
    println!("=== Populace Scheduler Harness ===\n");

    let mut results = Vec::new();

    // 1. Config validation sweep
    results.extend(validate_config(verbose));

    // 2. Clock tiers, window edges, latching
    results.extend(validate_clock(verbose));

    // 3. Region budget redistribution sweep
    results.extend(validate_budgets(verbose));

    // 4. Full scripted day against the headless host
    results.extend(validate_full_day(verbose));

    // 5. Failure injection: host not ready, streaming, bulk loss
    results.extend(validate_failure_modes(verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// Tight timings shared by the scenario sections.
fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        spawn_throttle_ticks: 4,
        spawn_defer_ticks: 1,
        spawn_settle_ticks: 1,
        check_interval_secs: 0.5,
        initial_settle_secs: 2.0,
        maintenance_interval_secs: 2.0,
        maintenance_interval_reduced_secs: 4.0,
        stuck_interval_secs: 1000.0,
        reconcile_interval_secs: 2.0,
        ..SchedulerConfig::default()
    }
}

fn run(sched: &mut PopulationScheduler<HeadlessWorld>, ticks: usize) {
    for _ in 0..ticks {
        sched.host_mut().drift(0.5);
        sched.tick(0.1);
    }
}

// ── 1. Config ───────────────────────────────────────────────────────────

fn validate_config(_verbose: bool) -> Vec<TestResult> {
    println!("--- Config Validation ---");
    let mut results = Vec::new();

    check(
        &mut results,
        "default_config_valid",
        SchedulerConfig::default().validate().is_ok(),
        "built-in defaults pass validation".into(),
    );

    let mut bad = SchedulerConfig::default();
    bad.active_end_minutes = bad.active_start_minutes;
    check(
        &mut results,
        "degenerate_window_rejected",
        bad.validate().is_err(),
        "start == end rejected".into(),
    );

    let mut bad = SchedulerConfig::default();
    bad.spawn_throttle_ticks = 0;
    check(
        &mut results,
        "zero_throttle_rejected",
        bad.validate().is_err(),
        "zero spawn throttle rejected".into(),
    );

    let mut bad = SchedulerConfig::default();
    bad.stuck_threshold = 0;
    check(
        &mut results,
        "zero_stuck_threshold_rejected",
        bad.validate().is_err(),
        "zero stuck threshold rejected".into(),
    );

    results
}

// ── 2. Clock ────────────────────────────────────────────────────────────

fn validate_clock(verbose: bool) -> Vec<TestResult> {
    println!("--- Activity Clock ---");
    let mut results = Vec::new();

    // Tier bands cover the whole day without gaps
    let mut counts = [0u32; 4];
    for m in 0..1440 {
        match Tier::from_minutes(m) {
            Tier::Morning => counts[0] += 1,
            Tier::Afternoon => counts[1] += 1,
            Tier::Evening => counts[2] += 1,
            Tier::Night => counts[3] += 1,
        }
    }
    check(
        &mut results,
        "tier_bands_cover_day",
        counts.iter().sum::<u32>() == 1440 && counts.iter().all(|&c| c > 0),
        format!(
            "morning={} afternoon={} evening={} night={}",
            counts[0], counts[1], counts[2], counts[3]
        ),
    );

    let mut clock = ActivityWindowClock::new(6 * 60, 21 * 60, 30);
    check(
        &mut results,
        "window_half_open",
        !clock.in_window(6 * 60 - 1)
            && clock.in_window(6 * 60)
            && clock.in_window(21 * 60 - 1)
            && !clock.in_window(21 * 60),
        "[06:00, 21:00) edges correct".into(),
    );

    let a = clock.observe(8 * 60);
    let b = clock.observe(8 * 60 + 5);
    check(
        &mut results,
        "activation_one_shot",
        a == Transition::Activated && b == Transition::None,
        format!("{:?} then {:?}", a, b),
    );

    let c = clock.observe(21 * 60 + 10);
    let d = clock.observe(21 * 60 + 40);
    check(
        &mut results,
        "deactivation_one_shot",
        c == Transition::Deactivated && d == Transition::None,
        format!("{:?} then {:?}", c, d),
    );

    // Walk to late night in sub-threshold steps, then wrap past midnight
    for m in [22 * 60 + 10, 22 * 60 + 40, 23 * 60 + 10, 23 * 60 + 40] {
        clock.observe(m);
    }
    let e = clock.observe(10);
    check(
        &mut results,
        "midnight_wrap_not_discontinuity",
        e == Transition::None,
        format!("23:40 -> 00:10 gave {:?}", e),
    );

    let mut clock = ActivityWindowClock::new(6 * 60, 21 * 60, 30);
    clock.observe(8 * 60);
    let f = clock.observe(14 * 60);
    check(
        &mut results,
        "forward_jump_flagged",
        f == Transition::DayJumped,
        format!("08:00 -> 14:00 gave {:?}", f),
    );

    if verbose {
        println!("  clock sweep done");
    }
    results
}

// ── 3. Region budgets ───────────────────────────────────────────────────

fn validate_budgets(_verbose: bool) -> Vec<TestResult> {
    println!("--- Budget Redistribution ---");
    let mut results = Vec::new();

    let caps = [3u32, 10, 10, 1];
    let caps_sum: u32 = caps.iter().sum();
    let mut all_ok = true;
    let mut detail = String::new();
    for budget in 0..=40u32 {
        let mut reg = RegionRegistry::new();
        for (i, &cap) in caps.iter().enumerate() {
            reg.register(Region::new(
                format!("r{}", i),
                Vec3::new(i as f32 * 200.0, 0.0, 0.0),
                20.0,
                cap,
            ));
        }
        reg.redistribute(budget);

        let targets: Vec<u32> = reg.iter().map(|(_, r)| r.target).collect();
        let sum: u32 = targets.iter().sum();
        let capped = targets.iter().zip(caps.iter()).all(|(t, c)| t <= c);
        if !capped || sum != budget.min(caps_sum) {
            all_ok = false;
            detail = format!(
                "budget {} gave targets {:?} (sum {}, want {})",
                budget,
                targets,
                sum,
                budget.min(caps_sum)
            );
            break;
        }
    }
    check(
        &mut results,
        "redistribute_property_sweep",
        all_ok,
        if all_ok {
            "targets capped and sum == min(budget, caps) for budgets 0..=40".into()
        } else {
            detail
        },
    );

    results
}

// ── 4. Full scripted day ────────────────────────────────────────────────

fn validate_full_day(verbose: bool) -> Vec<TestResult> {
    println!("--- Full Day Scenario ---");
    let mut results = Vec::new();

    let mut host = HeadlessWorld::new();
    host.sim_time = 500;

    let mut cfg = fast_config();
    cfg.tier_ceilings = TierCeilings {
        morning: 4,
        afternoon: 6,
        evening: 2,
        night: 0,
    };

    let mut sched = PopulationScheduler::new(host, cfg);
    sched.add_region(Region::new("market", Vec3::ZERO, 30.0, 10));
    sched.add_region(Region::new("docks", Vec3::new(500.0, 0.0, 0.0), 30.0, 10));
    sched.add_region(Region::sentry_post("gate", Vec3::new(250.0, 0.0, 0.0)));
    if sched.initialize().is_err() {
        check(&mut results, "initialize", false, "config rejected".into());
        return results;
    }

    run(&mut sched, 50);
    check(
        &mut results,
        "inactive_before_window",
        sched.host().live_count() == 0,
        format!("{} live agents at 05:00", sched.host().live_count()),
    );

    // Morning ceiling 4 over 3 regions: shares 2/1/1, sentry capped at 1
    sched.host_mut().sim_time = 800;
    run(&mut sched, 600);
    let stats = sched.stats();
    check(
        &mut results,
        "morning_convergence",
        stats.total_occupancy == 4 && stats.state == PopulationState::MaintenanceMode,
        format!("{} occupants, state {:?}", stats.total_occupancy, stats.state),
    );
    let sentry_occ = sched
        .registry()
        .get(RegionId(2))
        .map(|r| r.occupants.len())
        .unwrap_or(0);
    check(
        &mut results,
        "sentry_post_single",
        sentry_occ == 1,
        format!("sentry post holds {}", sentry_occ),
    );

    // Afternoon ceiling 6: shares 2/2/2 with sentry capped -> 5 total
    sched.host_mut().sim_time = 1300;
    run(&mut sched, 600);
    let stats = sched.stats();
    check(
        &mut results,
        "afternoon_convergence",
        stats.total_occupancy == 5,
        format!("{} occupants after tier change", stats.total_occupancy),
    );

    // Window closes: single sweep, everything pooled or destroyed
    sched.host_mut().sim_time = 2130;
    run(&mut sched, 50);
    let stats = sched.stats();
    check(
        &mut results,
        "deactivation_sweep",
        stats.total_occupancy == 0 && sched.host().active_count() == 0,
        format!(
            "{} occupants, {} active after close",
            stats.total_occupancy,
            sched.host().active_count()
        ),
    );
    let despawned = stats.despawned_total;
    run(&mut sched, 200);
    check(
        &mut results,
        "sweep_is_one_shot",
        sched.stats().despawned_total == despawned,
        "no repeat sweep while inactive".into(),
    );

    // Next morning: pooled agents are reused before fresh allocations
    let replicated = sched.host().replicated_count();
    sched.host_mut().sim_time = 800;
    run(&mut sched, 600);
    let stats = sched.stats();
    check(
        &mut results,
        "reactivation_reuses_pool",
        stats.total_occupancy == 4 && sched.host().replicated_count() == replicated,
        format!(
            "{} occupants, {} fresh replications",
            stats.total_occupancy,
            sched.host().replicated_count() - replicated
        ),
    );

    if verbose {
        match serde_json::to_string_pretty(&sched.stats()) {
            Ok(json) => println!("  final stats:\n{}", json),
            Err(e) => println!("  stats serialization failed: {}", e),
        }
    }
    results
}

// ── 5. Failure injection ────────────────────────────────────────────────

fn validate_failure_modes(_verbose: bool) -> Vec<TestResult> {
    println!("--- Failure Injection ---");
    let mut results = Vec::new();

    // Host not ready: spawns fail, scheduler keeps running, recovers later
    let mut host = HeadlessWorld::new();
    host.sim_time = 1300;
    host.prefab_missing = true;
    let mut cfg = fast_config();
    cfg.tier_ceilings.afternoon = 2;
    let mut sched = PopulationScheduler::new(host, cfg);
    sched.add_region(Region::new("plaza", Vec3::ZERO, 40.0, 2));
    let _ = sched.initialize();

    run(&mut sched, 200);
    let stalled = sched.host().live_count();
    sched.host_mut().prefab_missing = false;
    run(&mut sched, 600);
    check(
        &mut results,
        "spawn_failure_recovery",
        stalled == 0 && sched.stats().total_occupancy == 2,
        format!(
            "{} agents while failing, {} after recovery",
            stalled,
            sched.stats().total_occupancy
        ),
    );

    // Streaming spike: spawns hold back until the host is idle again
    let mut host = HeadlessWorld::new();
    host.sim_time = 1300;
    host.streaming_busy = true;
    let mut cfg = fast_config();
    cfg.tier_ceilings.afternoon = 2;
    let mut sched = PopulationScheduler::new(host, cfg);
    sched.add_region(Region::new("plaza", Vec3::ZERO, 40.0, 2));
    let _ = sched.initialize();

    run(&mut sched, 200);
    let held = sched.host().live_count();
    sched.host_mut().streaming_busy = false;
    run(&mut sched, 600);
    check(
        &mut results,
        "streaming_backoff",
        held == 0 && sched.stats().total_occupancy == 2,
        format!("{} spawned during spike, {} after", held, sched.stats().total_occupancy),
    );

    // Bulk external loss: reconciliation sees it and convergence restarts
    let mut host = HeadlessWorld::new();
    host.sim_time = 1300;
    let mut cfg = fast_config();
    cfg.tier_ceilings.afternoon = 6;
    let mut sched = PopulationScheduler::new(host, cfg);
    sched.add_region(Region::new("plaza", Vec3::ZERO, 40.0, 6));
    let _ = sched.initialize();

    run(&mut sched, 600);
    let converged = sched.stats().total_occupancy;
    sched.host_mut().kill_many(6);
    run(&mut sched, 600);
    let stats = sched.stats();
    check(
        &mut results,
        "bulk_loss_reconverges",
        converged == 6 && stats.total_occupancy == 6 && stats.drift_removed_total == 6,
        format!(
            "{} before, {} after, {} removed by reconciliation",
            converged, stats.total_occupancy, stats.drift_removed_total
        ),
    );

    results
}
