//! Pending pixmap requests: dedup, locality ordering and in-flight tracking.

use std::collections::HashMap;

use tracing::debug;

use crate::observer::ObserverId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixmapRequest {
    pub observer: ObserverId,
    pub page: usize,
    pub width: u32,
    pub height: u32,
}

impl PixmapRequest {
    pub fn new(observer: ObserverId, page: usize, width: u32, height: u32) -> Self {
        Self {
            observer,
            page,
            width,
            height,
        }
    }

    fn key(&self) -> RequestKey {
        (self.observer, self.page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    #[default]
    Append,
    /// Drop every pending request, for all observers, before enqueueing.
    RemoveAllPrevious,
}

/// How a delivered result relates to the request that is current for its pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Current,
    Superseded,
    Unknown,
}

type RequestKey = (ObserverId, usize);

#[derive(Debug)]
struct Pending {
    request: PixmapRequest,
    slot: u64,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    serial: u64,
    superseded: bool,
}

#[derive(Debug, Default)]
pub struct RequestQueue {
    pending: Vec<Pending>,
    in_flight: HashMap<RequestKey, InFlight>,
    next_slot: u64,
    next_serial: u64,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, requests: Vec<PixmapRequest>, mode: RequestMode) {
        if mode == RequestMode::RemoveAllPrevious && !self.pending.is_empty() {
            debug!(dropped = self.pending.len(), "clearing pending pixmap requests");
            self.pending.clear();
        }

        for request in requests {
            let key = request.key();
            if let Some(in_flight) = self.in_flight.get_mut(&key) {
                in_flight.superseded = true;
            }
            match self.pending.iter_mut().find(|p| p.request.key() == key) {
                // The newer request takes over the older one's submission slot.
                Some(existing) => existing.request = request,
                None => {
                    let slot = self.next_slot;
                    self.next_slot += 1;
                    self.pending.push(Pending { request, slot });
                }
            }
        }
    }

    /// Takes the request nearest `current_page`, skipping pairings in flight,
    /// and marks it dispatched under a fresh serial.
    pub fn pop_next(&mut self, current_page: Option<usize>) -> Option<(PixmapRequest, u64)> {
        let reference = current_page.unwrap_or(0);
        let index = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| !self.in_flight.contains_key(&p.request.key()))
            .min_by_key(|(_, p)| (p.request.page.abs_diff(reference), p.slot))
            .map(|(index, _)| index)?;

        let Pending { request, .. } = self.pending.remove(index);
        self.next_serial += 1;
        let serial = self.next_serial;
        self.in_flight.insert(
            request.key(),
            InFlight {
                serial,
                superseded: false,
            },
        );
        Some((request, serial))
    }

    /// Settles an in-flight request once its result arrives.
    pub fn complete(&mut self, observer: ObserverId, page: usize, serial: u64) -> Completion {
        let key = (observer, page);
        match self.in_flight.get(&key) {
            Some(in_flight) if in_flight.serial == serial => {
                let superseded = in_flight.superseded;
                self.in_flight.remove(&key);
                if superseded {
                    Completion::Superseded
                } else {
                    Completion::Current
                }
            }
            _ => Completion::Unknown,
        }
    }

    pub fn is_pending(&self, observer: ObserverId, page: usize) -> bool {
        self.pending.iter().any(|p| p.request.key() == (observer, page))
    }

    pub fn is_in_flight(&self, observer: ObserverId, page: usize) -> bool {
        self.in_flight.contains_key(&(observer, page))
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }

    pub fn remove_observer(&mut self, observer: ObserverId) {
        self.pending.retain(|p| p.request.observer != observer);
        for (key, in_flight) in self.in_flight.iter_mut() {
            if key.0 == observer {
                in_flight.superseded = true;
            }
        }
    }

    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Drops pending requests and marks every in-flight job stale. The
    /// pairings stay blocked until their stale result arrives.
    pub fn supersede_all(&mut self) {
        self.pending.clear();
        for in_flight in self.in_flight.values_mut() {
            in_flight.superseded = true;
        }
    }

    /// Forgets everything; later deliveries report `Completion::Unknown`.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.in_flight.clear();
    }
}
