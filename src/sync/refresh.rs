use tracing::debug;

/// Identifies one issued fetch so its completion can be matched up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchTicket(u64);

impl FetchTicket {
    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    /// Run a fetch and report back with this ticket.
    Start(FetchTicket),
    /// A fetch is already in flight; this request folds into it.
    Coalesced,
    /// Screen is not focused; the next focus catches up.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Newest fetch finished; apply its result.
    Current,
    /// A newer fetch was issued after this one; discard its result.
    Superseded,
}

/// Decides when the replica is re-fetched.
///
/// Focus always forces a fetch. Feed notifications fetch only while focused
/// and fold into an in-flight fetch. Only the newest ticket's result applies.
#[derive(Debug, Default)]
pub struct RefreshController {
    focused: bool,
    in_flight: Option<FetchTicket>,
    issued: u64,
}

impl RefreshController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn in_flight(&self) -> Option<FetchTicket> {
        self.in_flight
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }

    /// Initial fetch. Always forced, there is no prior data to protect.
    pub fn on_mount(&mut self) -> FetchTicket {
        self.issue()
    }

    pub fn on_focus(&mut self) -> FetchTicket {
        self.focused = true;
        self.issue()
    }

    pub fn on_blur(&mut self) {
        self.focused = false;
    }

    pub fn on_feed_notification(&mut self) -> FetchPlan {
        if !self.focused {
            debug!("Feed notification dropped while unfocused");
            return FetchPlan::Dropped;
        }
        self.fetch(false)
    }

    pub fn fetch(&mut self, force: bool) -> FetchPlan {
        if !force {
            if let Some(ticket) = self.in_flight {
                debug!(ticket = ticket.0, "Fetch coalesced into in-flight request");
                return FetchPlan::Coalesced;
            }
        }
        FetchPlan::Start(self.issue())
    }

    pub fn complete(&mut self, ticket: FetchTicket) -> Completion {
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
            Completion::Current
        } else {
            Completion::Superseded
        }
    }

    fn issue(&mut self) -> FetchTicket {
        self.issued += 1;
        let ticket = FetchTicket(self.issued);
        self.in_flight = Some(ticket);
        ticket
    }
}
