//! Effect control and playback through the player.

use crate::support::{flush, reference_player, TIMEOUT};
use oep_player::{Effect, OepConfig, PlaybackState};
use oep_render::SurfaceData;
use std::sync::Arc;

#[test]
fn loads_effect_and_forwards_script_calls() {
    let t = reference_player(OepConfig::new(320, 240), 0, None);
    t.player.load_effect("effects/glasses");
    flush(&t.player);

    let effect = t.manager.current_effect().expect("effect loaded");
    assert_eq!(effect.url(), "effects/glasses");

    t.player.call_js_method("setColor", r#"{"r":1}"#);
    assert_eq!(
        effect.js_calls(),
        vec![("setColor".to_string(), r#"{"r":1}"#.to_string())]
    );

    let (tx, rx) = crossbeam_channel::bounded(1);
    t.player
        .eval_js("Api.version()", Some(move |result: String| tx.send(result).unwrap()));
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "undefined");

    t.player.eval_js("noop()", None::<fn(String)>);
    assert_eq!(effect.scripts(), vec!["Api.version()", "noop()"]);
}

#[test]
fn script_calls_without_effect_are_ignored() {
    let t = reference_player(OepConfig::new(64, 64), 0, None);
    t.player.load_effect("effects/mask");
    t.player.unload_effect();
    flush(&t.player);
    assert!(t.manager.current_effect().is_none());

    t.player.call_js_method("setColor", "{}");
    let (tx, rx) = crossbeam_channel::bounded::<String>(1);
    t.player
        .eval_js("x", Some(move |result: String| tx.send(result).unwrap()));
    assert!(rx.try_recv().is_err());
}

#[test]
fn playback_controls_reach_the_engine() {
    let t = reference_player(OepConfig::new(64, 64), 0, None);
    assert_eq!(t.monitor.playback(), PlaybackState::Playing);

    t.player.pause();
    flush(&t.player);
    assert_eq!(t.monitor.playback(), PlaybackState::Paused);

    t.player.resume();
    flush(&t.player);
    assert_eq!(t.monitor.playback(), PlaybackState::Playing);

    t.player.stop();
    flush(&t.player);
    assert_eq!(t.monitor.playback(), PlaybackState::Stopped);
}

#[test]
fn surface_settings_reach_the_effect_manager() {
    let t = reference_player(OepConfig::new(128, 96), 0, None);
    flush(&t.player);
    assert_eq!(t.manager.effect_size(), (128, 96));
    assert!(t.manager.presentation_enabled());
    assert!(!t.manager.has_render_surface());

    let surface: SurfaceData = Arc::new(42u32);
    t.player.set_render_surface(Some(surface));
    t.player.disable_surface_presentation();
    t.player.surface_changed(96, 128).unwrap();
    flush(&t.player);

    assert!(t.manager.has_render_surface());
    assert!(!t.manager.presentation_enabled());
    assert_eq!(t.manager.effect_size(), (96, 128));
    assert_eq!(t.monitor.surface(), Some((96, 128)));

    t.player.set_render_surface(None);
    flush(&t.player);
    assert!(!t.manager.has_render_surface());
}
