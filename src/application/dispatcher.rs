//! Routes platform transaction updates back to the callers that started them.
//!
//! The routing table lives inside a single actor task. Every mutation
//! (registering a payment, installing the fallback handler, platform events)
//! arrives as a message on one channel and is applied in order, so a payment
//! is always registered before it is handed to the platform and events are
//! handled one at a time in delivery order.
//!
//! Results are handed to waiting callers through oneshot channels. The
//! fallback handler is invoked by a separate delivery task so slow user code
//! never holds up the routing table.
use crate::domain::ports::SharedPaymentQueue;
use crate::domain::transaction::{
    PendingPurchase, QueueEvent, TransactionHandle, TransactionOutcome, TransactionUpdate,
};
use crate::error::{PlatformError, Result, StoreError};
use log::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Catch-all handler for outcomes no pending purchase is waiting for.
pub type FallbackHandler = Arc<dyn Fn(TransactionOutcome) + Send + Sync>;

type RestoreResult = std::result::Result<(), PlatformError>;

enum Command {
    Register {
        product_id: String,
        responder: oneshot::Sender<TransactionOutcome>,
        registered: oneshot::Sender<()>,
    },
    SetFallback(Option<FallbackHandler>),
    RegisterRestore {
        responder: oneshot::Sender<RestoreResult>,
        registered: oneshot::Sender<()>,
    },
    Queue(QueueEvent),
}

/// Handle through which the platform adapter pushes queue events into the
/// dispatcher.
#[derive(Clone)]
pub struct QueueEventSink {
    sender: mpsc::UnboundedSender<Command>,
}

impl QueueEventSink {
    pub fn send(&self, event: QueueEvent) -> Result<()> {
        self.sender
            .send(Command::Queue(event))
            .map_err(|_| StoreError::DispatcherStopped)
    }

    pub fn transactions_updated(&self, updates: Vec<TransactionUpdate>) -> Result<()> {
        self.send(QueueEvent::TransactionsUpdated(updates))
    }
}

/// Owner of the routing table from product identifier to waiting callers.
#[derive(Clone)]
pub struct TransactionDispatcher {
    queue: SharedPaymentQueue,
    commands: mpsc::UnboundedSender<Command>,
}

impl TransactionDispatcher {
    /// Starts the routing actor on the current tokio runtime.
    pub fn spawn(queue: SharedPaymentQueue) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        let (deliveries, outbox) = mpsc::unbounded_channel();
        tokio::spawn(RoutingTable::new(deliveries).run(inbox));
        tokio::spawn(deliver_fallbacks(outbox));
        Self { queue, commands }
    }

    /// Dispatcher driven by a caller-owned command channel instead of the
    /// routing actor.
    #[cfg(test)]
    fn with_commands(queue: SharedPaymentQueue, commands: mpsc::UnboundedSender<Command>) -> Self {
        Self { queue, commands }
    }

    /// A dispatcher whose actor acknowledges registrations and then drops
    /// every waiting caller, as if it had stopped mid-purchase.
    #[cfg(test)]
    pub(crate) fn spawn_abandoning(queue: SharedPaymentQueue) -> Self {
        let (commands, mut inbox) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(command) = inbox.recv().await {
                if let Command::Register { registered, .. } = command {
                    let _ = registered.send(());
                }
            }
        });
        Self::with_commands(queue, commands)
    }

    pub fn event_sink(&self) -> QueueEventSink {
        QueueEventSink {
            sender: self.commands.clone(),
        }
    }

    pub fn can_make_payments(&self) -> bool {
        self.queue.can_make_payments()
    }

    /// Submits a payment and waits for its terminal outcome.
    ///
    /// The caller is registered under the payment's product identifier before
    /// the payment reaches the platform queue. If several callers are waiting
    /// on the same product, all of them receive the first outcome for it.
    ///
    /// Fails with `DispatcherStopped` if the payment was never submitted, and
    /// with `OutcomeLost` if it was submitted but its outcome can no longer be
    /// delivered.
    pub async fn submit(&self, payment: PendingPurchase) -> Result<TransactionOutcome> {
        let (responder, outcome) = oneshot::channel();
        let (registered, ack) = oneshot::channel();
        self.send(Command::Register {
            product_id: payment.product_id.clone(),
            responder,
            registered,
        })?;
        ack.await.map_err(|_| StoreError::DispatcherStopped)?;

        trace!("Submitting payment for {}", payment.product_id);
        self.queue.add_payment(payment).await;
        outcome.await.map_err(|_| StoreError::OutcomeLost)
    }

    pub fn set_fallback(&self, handler: FallbackHandler) -> Result<()> {
        self.send(Command::SetFallback(Some(handler)))
    }

    pub fn clear_fallback(&self) -> Result<()> {
        self.send(Command::SetFallback(None))
    }

    /// Tells the platform the transaction is fully processed. The routing
    /// table is not involved.
    pub async fn finalize(&self, transaction: &TransactionHandle) {
        debug!("Finishing transaction {:?}", transaction.transaction_id);
        self.queue.finish_transaction(transaction).await;
    }

    /// Restores previously completed transactions.
    ///
    /// Restored transactions themselves arrive through the fallback handler;
    /// this only reports whether the restore as a whole finished.
    pub async fn restore(&self) -> Result<()> {
        let (responder, finished) = oneshot::channel();
        let (registered, ack) = oneshot::channel();
        self.send(Command::RegisterRestore {
            responder,
            registered,
        })?;
        ack.await.map_err(|_| StoreError::DispatcherStopped)?;

        self.queue.restore_completed_transactions().await;
        finished
            .await
            .map_err(|_| StoreError::DispatcherStopped)?
            .map_err(StoreError::from)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| StoreError::DispatcherStopped)
    }
}

type Delivery = (FallbackHandler, TransactionOutcome);

struct RoutingTable {
    routes: HashMap<String, Vec<oneshot::Sender<TransactionOutcome>>>,
    fallback: Option<FallbackHandler>,
    restore_waiters: Vec<oneshot::Sender<RestoreResult>>,
    deliveries: mpsc::UnboundedSender<Delivery>,
}

impl RoutingTable {
    fn new(deliveries: mpsc::UnboundedSender<Delivery>) -> Self {
        Self {
            routes: HashMap::new(),
            fallback: None,
            restore_waiters: Vec::new(),
            deliveries,
        }
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Command>) {
        debug!("Transaction dispatcher started");
        while let Some(command) = inbox.recv().await {
            self.handle(command);
        }
        debug!("Transaction dispatcher stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register {
                product_id,
                responder,
                registered,
            } => {
                self.routes.entry(product_id).or_default().push(responder);
                let _ = registered.send(());
            }
            Command::SetFallback(handler) => self.fallback = handler,
            Command::RegisterRestore {
                responder,
                registered,
            } => {
                self.restore_waiters.push(responder);
                let _ = registered.send(());
            }
            Command::Queue(QueueEvent::TransactionsUpdated(updates)) => {
                for update in updates {
                    if let Some(outcome) = TransactionOutcome::from_update(update) {
                        self.route(outcome);
                    }
                }
            }
            Command::Queue(QueueEvent::RestoreFinished) => self.finish_restore(Ok(())),
            Command::Queue(QueueEvent::RestoreFailed(error)) => self.finish_restore(Err(error)),
        }
    }

    /// Hands the outcome to every caller still waiting on its product. When
    /// none of them can take it (none registered, or all gone) it goes to the
    /// fallback handler instead.
    fn route(&mut self, outcome: TransactionOutcome) {
        let product_id = outcome.transaction().product_id.clone();
        let waiters = self.routes.remove(&product_id).unwrap_or_default();
        let mut delivered = 0;
        for waiter in waiters {
            match waiter.send(outcome.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => debug!("Caller waiting on {product_id} went away"),
            }
        }
        if delivered > 0 {
            trace!("Delivered outcome for {product_id} to {delivered} callers");
            return;
        }

        match &self.fallback {
            Some(handler) => {
                trace!("No caller waiting on {product_id}, using fallback handler");
                let _ = self.deliveries.send((Arc::clone(handler), outcome));
            }
            None => warn!("Dropping unclaimed transaction outcome {outcome:?}"),
        }
    }

    fn finish_restore(&mut self, result: RestoreResult) {
        let waiters = std::mem::take(&mut self.restore_waiters);
        debug!("Restore finished, notifying {} waiters", waiters.len());
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

async fn deliver_fallbacks(mut outbox: mpsc::UnboundedReceiver<Delivery>) {
    while let Some((handler, outcome)) = outbox.recv().await {
        handler(outcome);
    }
}
