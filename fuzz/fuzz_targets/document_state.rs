//! Fuzz target for DocumentState
//!
//! # Invariants
//!
//! - Cursor always within the document
//! - History only grows, and only by accepted strokes
//! - Remote messages never produce a broadcast
//! - Local strokes are refused without write access

#![no_main]

use arbitrary::Arbitrary;
use cosign_core::{DocumentAction, DocumentConfig, DocumentState};
use cosign_proto::{Point, Stroke, SyncMessage};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum DocumentOp {
    DrawLocal { from: (i16, i16), to: (i16, i16) },
    ChangePage(u32),
    SetControl(bool),
    RemoteDraw { page: u32, from: (i16, i16), to: (i16, i16), width: u8 },
    RemotePage(u32),
    RemoteControl(bool),
}

fn point((x, y): (i16, i16)) -> Point {
    Point::new(f64::from(x), f64::from(y))
}

fuzz_target!(|input: (u8, bool, Vec<DocumentOp>)| {
    let (pages, write_access, ops) = input;
    let config = DocumentConfig { page_count: u32::from(pages).max(1), ..DocumentConfig::default() };
    let mut doc = DocumentState::new(config, write_access);

    for op in ops {
        let total_before = doc.history().total();
        let allowed = doc.write_access();

        let (result, remote) = match op {
            DocumentOp::DrawLocal { from, to } => {
                let stroke = doc.pen_stroke(point(from), point(to));
                let result = doc.draw_local(stroke);
                if !allowed {
                    assert!(result.is_err(), "stroke accepted without write access");
                }
                (result, false)
            },
            DocumentOp::ChangePage(page) => (doc.change_page(page), false),
            DocumentOp::SetControl(enabled) => (Ok(doc.set_control(enabled)), false),
            DocumentOp::RemoteDraw { page, from, to, width } => {
                let stroke = Stroke::new(point(from), point(to), "blue", f64::from(width));
                (doc.apply_remote(SyncMessage::Draw { point: stroke, page }), true)
            },
            DocumentOp::RemotePage(page) => (doc.apply_remote(SyncMessage::PageChange { page }), true),
            DocumentOp::RemoteControl(enabled) => {
                (doc.apply_remote(SyncMessage::Control { enabled }), true)
            },
        };

        assert!(doc.cursor() < doc.page_count(), "cursor escaped the document");
        assert!(doc.history().total() >= total_before, "history shrank");

        match result {
            Ok(actions) => {
                if remote {
                    assert!(
                        !actions.iter().any(|a| matches!(a, DocumentAction::Broadcast(_))),
                        "remote message echoed"
                    );
                }
            },
            Err(_) => assert_eq!(doc.history().total(), total_before, "rejected op mutated history"),
        }
    }
});
