//! Write-side queueing (spec.md §4.4).
//!
//! Three FIFOs feed the write loop: **priority**, **ordinary**, and a
//! single-slot **pointer-position** queue. [`SendQueue::next_packet`] drains
//! them in that order; pushing a new pointer-position packet silently
//! replaces any still-pending one, since only the most recent mouse
//! position is ever worth sending.

use crate::packet::Packet;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct SendQueue {
    priority: VecDeque<Packet>,
    ordinary: VecDeque<Packet>,
    pointer_position: Option<Packet>,
}

impl SendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_priority(&mut self, packet: Packet) {
        self.priority.push_back(packet);
    }

    pub fn push_ordinary(&mut self, packet: Packet) {
        self.ordinary.push_back(packet);
    }

    /// Replaces any pending pointer-position packet with `packet`.
    pub fn push_pointer_position(&mut self, packet: Packet) {
        self.pointer_position = Some(packet);
    }

    /// Pops the next packet to send: priority first, then ordinary, then
    /// the single pending pointer-position packet (if any).
    pub fn next_packet(&mut self) -> Option<Packet> {
        if let Some(p) = self.priority.pop_front() {
            return Some(p);
        }
        if let Some(p) = self.ordinary.pop_front() {
            return Some(p);
        }
        self.pointer_position.take()
    }

    /// Whether the write loop should stay woken (spec.md §4.4
    /// "source-has-more").
    pub fn has_more(&self) -> bool {
        !self.priority.is_empty() || !self.ordinary.is_empty() || self.pointer_position.is_some()
    }
}
