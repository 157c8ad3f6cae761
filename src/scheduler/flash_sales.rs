//! Flash sale activation sweep

use serde::Serialize;

use crate::config::ActivationMode;
use crate::domain::aggregates::FlashSale;
use crate::ids::FlashSaleId;
use crate::services::Deps;
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub examined: usize,
    pub activated: Option<FlashSaleId>,
    pub deactivated: Vec<FlashSaleId>,
}

/// Flags the sale whose window contains now as active.
///
/// In [`ActivationMode::Exclusive`] the first running sale (creation order)
/// is activated and every other sale deactivated. In
/// [`ActivationMode::LegacyPartialScan`] the scan deactivates sales until it
/// reaches the first running one, activates it and stops, so an older flag on
/// a later sale can survive.
pub async fn activate_flash_sales(deps: &Deps, mode: ActivationMode) -> Result<ActivationReport> {
    let now = deps.clock.now();
    let mut tx = deps.store.begin().await?;
    let mut sales = tx.flash_sales().await?;
    let mut report = ActivationReport::default();

    let running = sales.iter().position(|s| s.is_running_at(now));
    for (idx, sale) in sales.iter_mut().enumerate() {
        report.examined += 1;
        if Some(idx) == running {
            if sale.activate() {
                report.activated = Some(sale.id);
            }
            if mode == ActivationMode::LegacyPartialScan {
                save(tx.as_mut(), sale).await?;
                break;
            }
        } else if sale.deactivate() {
            report.deactivated.push(sale.id);
        }
        save(tx.as_mut(), sale).await?;
    }
    tx.commit().await?;

    let events = sales.iter_mut().flat_map(FlashSale::take_events).collect();
    deps.events.publish(events).await;
    tracing::info!(?mode, examined = report.examined, activated = ?report.activated, deactivated = report.deactivated.len(), "flash sale sweep done");
    Ok(report)
}

async fn save(tx: &mut dyn crate::store::StoreTx, sale: &FlashSale) -> Result<()> {
    tx.update_flash_sale(sale).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use testresult::TestResult;

    use super::*;
    use crate::test_support::Harness;

    /// Sales A, B and C in creation order, with only B running.
    async fn three_sales(h: &Harness) -> (FlashSale, FlashSale, FlashSale) {
        let now = h.clock_now();
        let a = h.insert_flash_sale("A", now - Duration::hours(3), now - Duration::hours(2), true).await;
        let b = h.insert_flash_sale("B", now - Duration::hours(1), now + Duration::hours(1), false).await;
        let c = h.insert_flash_sale("C", now + Duration::hours(2), now + Duration::hours(3), true).await;
        (a, b, c)
    }

    #[tokio::test]
    async fn exclusive_mode_leaves_one_active_sale() -> TestResult {
        let h = Harness::new();
        let (a, b, c) = three_sales(&h).await;

        let report = activate_flash_sales(&h.ctx.deps, ActivationMode::Exclusive).await?;
        assert_eq!(report.activated, Some(b.id));
        assert_eq!(report.deactivated, vec![a.id, c.id]);

        let active: Vec<_> = h.ctx.flash_sales.list().await?.into_iter().filter(|s| s.active).map(|s| s.id).collect();
        assert_eq!(active, vec![b.id]);
        Ok(())
    }

    #[tokio::test]
    async fn legacy_scan_stops_at_first_running_sale() -> TestResult {
        let h = Harness::new();
        let (a, b, c) = three_sales(&h).await;

        let report = activate_flash_sales(&h.ctx.deps, ActivationMode::LegacyPartialScan).await?;
        assert_eq!(report.examined, 2);
        assert_eq!(report.activated, Some(b.id));
        assert_eq!(report.deactivated, vec![a.id]);

        assert!(!h.ctx.flash_sales.get(a.id).await?.active);
        assert!(h.ctx.flash_sales.get(b.id).await?.active);
        assert!(h.ctx.flash_sales.get(c.id).await?.active);
        Ok(())
    }

    #[tokio::test]
    async fn nothing_running_deactivates_everything() -> TestResult {
        let h = Harness::new();
        let now = h.clock_now();
        h.insert_flash_sale("Old", now - Duration::hours(2), now - Duration::hours(1), true).await;

        for mode in [ActivationMode::Exclusive, ActivationMode::LegacyPartialScan] {
            activate_flash_sales(&h.ctx.deps, mode).await?;
            assert!(h.ctx.flash_sales.active().await?.is_none());
        }
        Ok(())
    }
}
