//! Console rendering for the tracking and locate views
//!
//! The tracking view repaints the whole console per update: vehicle
//! header, current navigation hint, position on the route, neighbour
//! stops with a progress bar for the current leg, and the next few
//! upcoming waypoints.

use linetrack::{format_distance, ManeuverPlan, NavigationState};

/// Upcoming waypoints shown below the live view
const UPCOMING_LIMIT: usize = 3;

/// Width of the inter-stop progress bar in characters
const BAR_WIDTH: usize = 50;

/// Clears the terminal and moves the cursor home.
pub fn clear_console() {
    print!("\x1b[2J\x1b[1;1H");
}

fn format_timestamp(timestamp: f64) -> String {
    let seconds = timestamp as u64;
    let (h, m, s) = (
        (seconds / 3600) % 24,
        (seconds / 60) % 60,
        seconds % 60,
    );
    format!("{:02}:{:02}:{:02} UTC", h, m, s)
}

/// Renders one full tracking frame.
pub fn print_tracking_view(vehicle_id: &str, state: &NavigationState, plan: &ManeuverPlan) {
    clear_console();

    println!("=== VEHICLE TRACKING ===");
    println!("Vehicle number: {}", vehicle_id);
    if let Some(line) = &state.fix.line {
        println!("Line: {}", line);
    }
    if let Some(brigade) = &state.fix.brigade {
        println!("Brigade: {}", brigade);
    }
    if let Some(timestamp) = state.fix.timestamp {
        println!("Fix time: {}", format_timestamp(timestamp));
    }
    if let Some(speed) = state.fix.speed {
        println!("Speed: {:.1} km/h", speed);
    }

    println!("\n=== NAVIGATION ===");
    match &state.maneuver_hint {
        Some(hint) => println!("In {}: {}", format_distance(hint.distance_m), hint.instruction),
        None => println!("You have arrived."),
    }

    println!("\n--- POSITION ON ROUTE ---");
    println!(
        "GPS position: ({:.6}, {:.6})",
        state.fix.latitude, state.fix.longitude
    );
    println!("Distance from start: {:.2} m", state.distance_from_start);
    println!("Distance from route: {:.2} m", state.lateral_deviation_m);
    println!("Route progress: {:.2}%", state.progress_pct);
    println!(
        "Segment: way {} ({:.0}% of {:.0} m)",
        state.segment.way_id, state.segment.pct, state.segment.way_length
    );

    println!("\n--- STOPS ---");
    match &state.previous_stop {
        Some(stop) => {
            println!("Previous stop: {}", stop.label());
            println!("  {:.2} m behind", stop.distance_to_vehicle);
        }
        None => println!("No previous stop (start of the route)"),
    }
    match &state.next_stop {
        Some(stop) => {
            println!("Next stop: {}", stop.label());
            println!("  {:.2} m ahead", stop.distance_to_vehicle);
        }
        None => println!("No next stop (end of the route)"),
    }

    if let (Some(prev), Some(next), Some(leg)) = (
        &state.previous_stop,
        &state.next_stop,
        state.leg_progress_pct(),
    ) {
        let filled = ((BAR_WIDTH as f64) * leg / 100.0) as usize;
        let filled = filled.min(BAR_WIDTH);
        let bar: String = "█".repeat(filled) + &"░".repeat(BAR_WIDTH - filled);
        println!("\nLeg: {} → {} ({:.1}%)", prev.label(), next.label(), leg);
        println!("{} {} {}", prev.label(), bar, next.label());
    }

    let upcoming: Vec<_> = plan
        .maneuvers()
        .iter()
        .filter(|m| m.distance_from_start > state.distance_from_start)
        .take(UPCOMING_LIMIT)
        .collect();
    if !upcoming.is_empty() {
        println!("\n--- UPCOMING ---");
        for maneuver in upcoming {
            let ahead = maneuver.distance_from_start - state.distance_from_start;
            println!("  • in {}: {}", format_distance(ahead), maneuver.instruction);
        }
    }

    println!("\nPress Ctrl+C to stop tracking...");
}

/// Renders the one-shot locate report.
pub fn print_locate_report(state: &NavigationState, total_length: f64) {
    println!("=== POSITION ON ROUTE ===");
    println!(
        "Query position (lat, lon): ({:.6}, {:.6})",
        state.fix.latitude, state.fix.longitude
    );
    println!(
        "Nearest point on route (lat, lon): ({:.6}, {:.6})",
        state.nearest_point.lat(),
        state.nearest_point.lon()
    );
    println!("Distance from start: {:.2} m", state.distance_from_start);
    println!("Distance from route: {:.2} m", state.lateral_deviation_m);
    println!("Route length: {:.2} m", total_length);
    println!("Progress: {:.2}%", state.progress_pct);
    println!(
        "Segment: way {} (index {}), {:.2} m / {:.2} m ({:.1}%)",
        state.segment.way_id,
        state.segment.way_index,
        state.segment.offset_in_way,
        state.segment.way_length,
        state.segment.pct
    );
    if state.segment.clamped {
        println!("  warning: position outside the route, clamped");
    }

    match &state.previous_stop {
        Some(stop) => println!(
            "Previous stop: {} ({:.2} m behind)",
            stop.label(),
            stop.distance_to_vehicle
        ),
        None => println!("Previous stop: none (start of the route)"),
    }
    match &state.next_stop {
        Some(stop) => println!(
            "Next stop: {} ({:.2} m ahead)",
            stop.label(),
            stop.distance_to_vehicle
        ),
        None => println!("Next stop: none (end of the route)"),
    }
}
