use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

/// Requests the shell schedules or cancels a one-shot timer.
///
/// The `id` is chosen by the core and echoed back in the output, so
/// completions can be matched against the timer that is still current.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerOperation {
    NotifyAfter { id: u64, millis: u64 },
    Clear { id: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerOutput {
    /// The timer with this id ran to completion.
    Elapsed { id: u64 },
    /// The timer with this id was cancelled before it fired.
    Cleared { id: u64 },
}

impl Operation for TimerOperation {
    type Output = TimerOutput;
}

pub struct Timer<Ev> {
    context: CapabilityContext<TimerOperation, Ev>,
}

impl<Ev> Capability<Ev> for Timer<Ev> {
    type Operation = TimerOperation;
    type MappedSelf<MappedEv> = Timer<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Timer::new(self.context.map_event(f))
    }
}

impl<Ev> Timer<Ev>
where
    Ev: 'static,
{
    #[must_use]
    pub fn new(context: CapabilityContext<TimerOperation, Ev>) -> Self {
        Self { context }
    }

    /// Arm a one-shot timer. The shell replies with `Elapsed { id }`
    /// after `millis`, or `Cleared { id }` if `clear` wins the race.
    pub fn notify_after<F>(&self, id: u64, millis: u64, make_event: F)
    where
        F: FnOnce(TimerOutput) -> Ev + Send + 'static,
        Ev: Send,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let output = context
                .request_from_shell(TimerOperation::NotifyAfter { id, millis })
                .await;
            context.update_app(make_event(output));
        });
    }

    /// Cancel a previously armed timer. The acknowledgement is not
    /// routed back to the app; staleness is handled by id instead.
    pub fn clear(&self, id: u64)
    where
        Ev: Send,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let _ = context
                .request_from_shell(TimerOperation::Clear { id })
                .await;
        });
    }
}
