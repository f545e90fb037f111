//! Layout properties of the frame driver under random comment streams.

use danmaku::{
    Danmaku, DanmakuConfig, DanmakuHost, DanmakuLocation, DanmakuStyle, LanePacking, Placement,
    PresentationState, ScrollSpeed, Viewport, scroll_x,
};
use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;

const WIDTH: f64 = 800.0;
const EPS: f64 = 1e-3;

/// One pixel per byte, so widths come straight from the generated text.
fn byte_measurer(text: &str, _: &DanmakuStyle) -> Option<f64> {
    Some(text.len() as f64)
}

/// Four 20 px rows, 8 s crossing.
fn config(packing: LanePacking, gap: f64) -> DanmakuConfig {
    DanmakuConfig {
        style: DanmakuStyle {
            font_size: 20.0,
            stroke_width: 0.0,
            line_spacing: 0.0,
            ..Default::default()
        },
        display_area: 1.0,
        speed: ScrollSpeed::crossing(Duration::from_secs(8)),
        safe_separation: gap,
        lane_packing: packing,
        max_entry_delay_ms: None,
        ..Default::default()
    }
}

fn host(config: DanmakuConfig) -> DanmakuHost {
    DanmakuHost::new(config, Viewport::new(WIDTH, 80.0), byte_measurer).unwrap()
}

#[derive(Debug, Clone)]
struct Arrival {
    at_ms: u64,
    width: usize,
    location: DanmakuLocation,
}

fn arrival() -> impl Strategy<Value = Arrival> {
    (
        0u64..20_000,
        1usize..400,
        prop_oneof![
            6 => Just(DanmakuLocation::Scroll),
            1 => Just(DanmakuLocation::Top),
            1 => Just(DanmakuLocation::Bottom),
        ],
    )
        .prop_map(|(at_ms, width, location)| Arrival {
            at_ms,
            width,
            location,
        })
}

/// Feed arrivals in time order, one tick per arrival.
fn replay(host: &mut DanmakuHost, mut arrivals: Vec<Arrival>) {
    arrivals.sort_by_key(|a| a.at_ms);
    let tx = host.sender();
    for (i, a) in arrivals.iter().enumerate() {
        let text = "w".repeat(a.width);
        assert!(tx.offer(Danmaku::new(i.to_string(), text).with_location(a.location)));
        host.tick(Duration::from_millis(a.at_ms));
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    placement: Placement,
    enter: Duration,
    exit: Duration,
    width: f64,
}

fn windows(host: &DanmakuHost) -> HashMap<String, Window> {
    host.presentations()
        .iter()
        .map(|p| {
            (
                p.danmaku().id.clone(),
                Window {
                    placement: p.placement().unwrap(),
                    enter: p.enter_time().unwrap(),
                    exit: p.exit_time().unwrap(),
                    width: p.width(),
                },
            )
        })
        .collect()
}

fn x_of(w: &Window, t: Duration) -> f64 {
    match w.placement {
        Placement::Lane(_) => scroll_x(t, w.enter, w.exit - w.enter, WIDTH, w.width),
        _ => (WIDTH - w.width) / 2.0,
    }
}

/// No two live comments in the same row come closer than `gap` while both
/// are on screen, and fixed comments never share a slot at the same time.
fn assert_rows_apart(
    host: &DanmakuHost,
    packing: LanePacking,
    gap: f64,
) -> Result<(), TestCaseError> {
    let mut placed: Vec<Window> = windows(host).into_values().collect();
    placed.sort_by_key(|w| w.enter);

    for (i, a) in placed.iter().enumerate() {
        for b in &placed[i + 1..] {
            if a.placement != b.placement || b.enter >= a.exit {
                continue;
            }
            prop_assert!(
                matches!(a.placement, Placement::Lane(_)),
                "fixed slot shared: {a:?} {b:?}"
            );
            prop_assert_eq!(packing, LanePacking::CatchUpSafe);
            // Relative motion is linear, so checking the ends of the
            // shared interval covers all of it.
            let trailing = x_of(a, b.enter) + a.width;
            prop_assert!(
                x_of(b, b.enter) >= trailing + gap - EPS,
                "too close on entry: {a:?} {b:?}"
            );
            prop_assert!(
                x_of(b, a.exit) >= gap - EPS,
                "caught up before exit: {a:?} {b:?}"
            );
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// For any stream, a comment never reaches the trailing edge of the one
    /// placed ahead of it in the same lane while both are on screen, and
    /// fixed comments never share a slot at the same time.
    #[test]
    fn prop_no_overlap_within_a_row(
        arrivals in prop::collection::vec(arrival(), 1..80),
        dense in any::<bool>(),
        gap in 0.0f64..60.0,
    ) {
        let packing = if dense { LanePacking::CatchUpSafe } else { LanePacking::ExitClear };
        let mut host = host(config(packing, gap));
        // Nothing retires before everything has been placed
        let mut arrivals = arrivals;
        for a in &mut arrivals {
            a.at_ms /= 4;
        }
        replay(&mut host, arrivals);

        assert_rows_apart(&host, packing, gap)?;
    }

    /// Lane and slot tables that shrink and grow again under config swaps
    /// still remember the comments on screen in the rows they cover.
    #[test]
    fn prop_no_overlap_across_row_count_changes(
        steps in prop::collection::vec(
            (arrival(), prop::option::of(prop::sample::select(vec![0.25, 0.5, 1.0]))),
            1..80,
        ),
        dense in any::<bool>(),
        gap in 0.0f64..60.0,
    ) {
        let packing = if dense { LanePacking::CatchUpSafe } else { LanePacking::ExitClear };
        let mut host = host(config(packing, gap));
        let handle = host.config_handle();
        let tx = host.sender();

        let mut steps = steps;
        for (a, _) in &mut steps {
            a.at_ms /= 4;
        }
        steps.sort_by_key(|(a, _)| a.at_ms);

        for (i, (a, display_area)) in steps.iter().enumerate() {
            if let Some(area) = *display_area {
                handle.modify(|c| c.display_area = area).unwrap();
            }
            prop_assert!(tx.offer(Danmaku::new(i.to_string(), "w".repeat(a.width))
                .with_location(a.location)));
            host.tick(Duration::from_millis(a.at_ms));
        }

        assert_rows_apart(&host, packing, gap)?;
    }

    /// After a seek in either direction the frame holds exactly the live
    /// comments whose window contains the new time, at the right position,
    /// and only comments that ended before some earlier seek are gone.
    #[test]
    fn prop_seek_shows_exactly_active_comments(
        arrivals in prop::collection::vec(arrival(), 1..40),
        seeks in prop::collection::vec(0u64..40_000, 1..12),
    ) {
        let mut host = host(config(LanePacking::ExitClear, 0.0));
        let mut arrivals = arrivals;
        for a in &mut arrivals {
            a.at_ms = 0;
        }
        replay(&mut host, arrivals);
        let all = windows(&host);

        let mut furthest = Duration::ZERO;
        for ms in seeks {
            let t = Duration::from_millis(ms);
            furthest = furthest.max(t);
            let frame = host.seek(t);

            let live = windows(&host);
            for (id, w) in &all {
                if !live.contains_key(id) {
                    prop_assert!(w.exit <= furthest, "{id} purged early");
                }
            }

            let mut expected: Vec<&String> = live
                .iter()
                .filter(|(_, w)| w.enter <= t && t < w.exit)
                .map(|(id, _)| id)
                .collect();
            expected.sort();
            let mut shown: Vec<&String> = frame.items.iter().map(|i| &i.danmaku.id).collect();
            shown.sort();
            prop_assert_eq!(shown, expected);

            for item in &frame.items {
                let w = &live[&item.danmaku.id];
                prop_assert!((item.x - x_of(w, t)).abs() < EPS);
            }
        }
    }

    /// Under a forward-only clock no presentation ever moves to an earlier
    /// state, and a retired one never comes back.
    #[test]
    fn prop_retirement_is_monotonic(
        arrivals in prop::collection::vec(arrival(), 1..60),
        steps in prop::collection::vec(1u64..2_000, 1..40),
    ) {
        let mut host = host(config(LanePacking::CatchUpSafe, 20.0));
        let tx = host.sender();
        let mut arrivals = arrivals;
        arrivals.sort_by_key(|a| a.at_ms);

        let mut states: HashMap<String, PresentationState> = HashMap::new();
        let mut retired: Vec<String> = Vec::new();
        let mut now = 0u64;
        let mut next = 0;

        for step in steps {
            now += step;
            while next < arrivals.len() && arrivals[next].at_ms <= now {
                let a = &arrivals[next];
                tx.offer(Danmaku::new(next.to_string(), "w".repeat(a.width))
                    .with_location(a.location));
                next += 1;
            }
            host.tick(Duration::from_millis(now));

            let current: HashMap<String, PresentationState> = host
                .presentations()
                .iter()
                .map(|p| (p.danmaku().id.clone(), p.state()))
                .collect();

            for (id, state) in &current {
                prop_assert!(!retired.contains(id), "{id} came back");
                if let Some(previous) = states.get(id) {
                    prop_assert!(state >= previous, "{id} went from {previous:?} to {state:?}");
                }
            }
            for id in states.keys() {
                if !current.contains_key(id) {
                    retired.push(id.clone());
                }
            }
            states = current;
        }
    }

    /// Ticking twice at the same time yields the same frame.
    #[test]
    fn prop_tick_is_idempotent(
        arrivals in prop::collection::vec(arrival(), 1..40),
        at in 0u64..30_000,
    ) {
        let mut host = host(config(LanePacking::CatchUpSafe, 10.0));
        replay(&mut host, arrivals);

        let t = Duration::from_millis(at).max(host.now());
        let first = host.tick(t);
        let second = host.tick(t);
        prop_assert_eq!(first, second);
    }
}
