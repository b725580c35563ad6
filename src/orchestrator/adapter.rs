//! All-or-nothing gate between restore and the execution queue.
//!
//! The queue only accepts testing-platform test applications. The adapter
//! walks modules in collection order and wraps each one into a
//! [`TestApplication`]. The first module that does not qualify ends the
//! pass: everything wrapped so far is dropped, which releases its host,
//! and the batch is reported as [`Eligibility::Ineligible`].

use std::sync::Arc;

use tracing::{debug, info};

use super::queue::ExecutionQueue;
use super::runner::TestApplication;
use crate::host::{HostProvider, HostResult, TestHost};
use crate::module::TestModule;

/// Result of the eligibility pass.
pub enum Eligibility<H: TestHost> {
    /// Every module qualified; one unit per module, in module order.
    AllEligible(Vec<TestApplication<H>>),

    /// The batch was rejected at `rejected`. No unit survives.
    Ineligible {
        /// The first module that did not qualify.
        rejected: TestModule,
    },
}

impl<H: TestHost + 'static> Eligibility<H> {
    /// Returns `true` for [`Eligibility::AllEligible`].
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::AllEligible(_))
    }

    /// Enqueues every unit of an eligible batch and returns `true`.
    ///
    /// An ineligible batch enqueues nothing and returns `false`.
    pub fn enqueue_into(self, queue: &mut ExecutionQueue) -> bool {
        match self {
            Eligibility::AllEligible(units) => {
                info!("Enqueueing {} test applications", units.len());
                for unit in units {
                    queue.enqueue(unit);
                }
                true
            }
            Eligibility::Ineligible { rejected } => {
                debug!("Not enqueueing: {} is not eligible", rejected.display_name());
                false
            }
        }
    }
}

/// Wraps every module into a runnable unit if all of them qualify.
///
/// Stops at the first module that is not both a test project and a
/// testing-platform application. Hosts are created as modules are wrapped;
/// on rejection or a creation error they are released before returning.
///
/// # Errors
///
/// Returns the provider's error if a host cannot be created.
pub fn build_eligible_units<P: HostProvider>(
    modules: &[TestModule],
    args: Arc<[String]>,
    provider: &P,
) -> HostResult<Eligibility<P::Host>> {
    let mut units = Vec::with_capacity(modules.len());

    for module in modules {
        if !module.is_queue_eligible() {
            debug!(
                "{} is not a testing-platform test application; releasing {} unit(s)",
                module.display_name(),
                units.len()
            );
            return Ok(Eligibility::Ineligible {
                rejected: module.clone(),
            });
        }

        let host = provider.create_host(module)?;
        units.push(TestApplication::new(module.clone(), host, Arc::clone(&args)));
    }

    Ok(Eligibility::AllEligible(units))
}
