use jtag_apb::statemachine::{tms_path, JtagState, ScanAction};
use jtag_apb::tap::{DrFeedback, JtagPins, TapController};
use proptest::collection::vec;
use proptest::prelude::*;

/// Transition graph written out the long way
fn reference_next(state: JtagState, tms: bool) -> JtagState {
    use JtagState::*;
    match (state, tms) {
        (Reset, true) => Reset,
        (Reset, false) => Idle,
        (Idle, true) => SelectDR,
        (Idle, false) => Idle,
        (SelectDR, true) => SelectIR,
        (SelectDR, false) => CaptureDR,
        (CaptureDR, true) => Exit1DR,
        (CaptureDR, false) => ShiftDR,
        (ShiftDR, true) => Exit1DR,
        (ShiftDR, false) => ShiftDR,
        (Exit1DR, true) => UpdateDR,
        (Exit1DR, false) => PauseDR,
        (PauseDR, true) => Exit2DR,
        (PauseDR, false) => PauseDR,
        (Exit2DR, true) => UpdateDR,
        (Exit2DR, false) => ShiftDR,
        (UpdateDR, true) => SelectDR,
        (UpdateDR, false) => Idle,
        (SelectIR, true) => Reset,
        (SelectIR, false) => CaptureIR,
        (CaptureIR, true) => Exit1IR,
        (CaptureIR, false) => ShiftIR,
        (ShiftIR, true) => Exit1IR,
        (ShiftIR, false) => ShiftIR,
        (Exit1IR, true) => UpdateIR,
        (Exit1IR, false) => PauseIR,
        (PauseIR, true) => Exit2IR,
        (PauseIR, false) => PauseIR,
        (Exit2IR, true) => UpdateIR,
        (Exit2IR, false) => ShiftIR,
        (UpdateIR, true) => SelectDR,
        (UpdateIR, false) => Idle,
    }
}

fn any_state() -> impl Strategy<Value = JtagState> {
    (0..16usize).prop_map(|i| JtagState::ALL[i])
}

proptest! {
    #[test]
    fn random_walk_matches_reference(start in any_state(), tms in vec(any::<bool>(), 0..200)) {
        let mut state = start;
        for &t in &tms {
            let next = state.next(t);
            prop_assert_eq!(next, reference_next(state, t));
            state = next;
        }
    }

    #[test]
    fn controller_follows_walk(tms in vec(any::<bool>(), 0..200), tdi in vec(any::<bool>(), 200)) {
        let mut tap = TapController::new();
        let mut state = JtagState::Reset;
        for (&t, &d) in tms.iter().zip(&tdi) {
            tap.tick(JtagPins::new(t, d), DrFeedback::register(8, 0x5a));
            state = reference_next(state, t);
            prop_assert_eq!(tap.state(), state);
        }
    }

    #[test]
    fn five_highs_reset_from_any_walk(tms in vec(any::<bool>(), 0..64)) {
        let state = tms.iter().fold(JtagState::Reset, |s, &t| s.next(t));
        let state = [true; 5].iter().fold(state, |s, &t| s.next(t));
        prop_assert_eq!(state, JtagState::Reset);
    }

    #[test]
    fn tms_path_arrives(from in any_state(), to in any_state()) {
        let path = tms_path(from, to);
        let end = path.iter().fold(from, |s, &t| s.next(t));
        prop_assert_eq!(end, to);
        prop_assert!(path.len() <= 8);
    }
}

#[test]
fn scan_actions() {
    assert_eq!(JtagState::CaptureDR.dr_action(), ScanAction::Capture);
    assert_eq!(JtagState::ShiftDR.dr_action(), ScanAction::Shift);
    assert_eq!(JtagState::UpdateDR.dr_action(), ScanAction::Update);
    for state in [JtagState::Idle, JtagState::PauseDR, JtagState::CaptureIR, JtagState::ShiftIR, JtagState::UpdateIR] {
        assert_eq!(state.dr_action(), ScanAction::Idle);
    }
}

#[test]
fn paths_to_reset_and_idle() {
    assert_eq!(tms_path(JtagState::ShiftDR, JtagState::Reset), [true; 5]);
    assert_eq!(tms_path(JtagState::Reset, JtagState::Idle), [false]);
    assert_eq!(tms_path(JtagState::Idle, JtagState::ShiftIR), [true, true, false, false]);
    assert!(tms_path(JtagState::PauseDR, JtagState::PauseDR).is_empty());
}
