//! Consumption calculator.
//!
//! Recomputes every component's material requirement for a new order
//! quantity. Manual components multiply their write-once anchor by the
//! quantity; calculated components re-evaluate their formula. Invalid order
//! quantities leave every component untouched.

use rust_decimal::Decimal;
use serde::Serialize;

use bagforge_core::{ComponentId, MaterialId};

use crate::component::{Component, ConsumptionBasis};
use crate::formula::FormulaError;
use crate::quantity::{OrderQuantity, QuantityRejected};

/// A component together with what its material costs at the current rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CostedComponent {
    pub component: Component,
    pub material_cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Manual component without a per-unit anchor.
    NoConsumption,
    /// The formula could not be evaluated for this geometry.
    Formula { detail: String },
    /// Consumption or its cost does not fit a decimal.
    Overflow,
}

impl From<FormulaError> for SkipReason {
    fn from(value: FormulaError) -> Self {
        match value {
            FormulaError::Overflow => SkipReason::Overflow,
            other => SkipReason::Formula {
                detail: other.to_string(),
            },
        }
    }
}

/// A component whose consumption was left as it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedComponent {
    pub component_id: ComponentId,
    pub reason: SkipReason,
}

/// Outcome of one recalculation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recalculation {
    /// The accepted quantity, or `None` when the input was rejected.
    pub order_quantity: Option<OrderQuantity>,
    #[serde(skip)]
    pub rejected: Option<QuantityRejected>,
    pub components: Vec<CostedComponent>,
    pub total_material_cost: Decimal,
    pub skipped: Vec<SkippedComponent>,
}

impl Recalculation {
    /// Whether the order quantity was accepted and consumptions recomputed.
    pub fn applied(&self) -> bool {
        self.order_quantity.is_some()
    }

    pub fn into_components(self) -> Vec<Component> {
        self.components.into_iter().map(|c| c.component).collect()
    }
}

/// Recompute consumption and material cost for `components` at `order_quantity`.
///
/// `rate_of` looks up the current rate of a material; components whose
/// material has no rate cost nothing. A rejected quantity is not an error:
/// the components come back unchanged and `applied()` is false. A component
/// whose cost would overflow keeps its prior consumption, costs nothing and
/// is reported as skipped.
pub fn recalculate<Q, F>(order_quantity: Q, components: &[Component], rate_of: F) -> Recalculation
where
    Q: TryInto<OrderQuantity>,
    Q::Error: Into<QuantityRejected>,
    F: Fn(MaterialId) -> Option<Decimal>,
{
    let quantity = match order_quantity.try_into() {
        Ok(q) => q,
        Err(rejected) => return unchanged(components, &rate_of, rejected.into()),
    };

    let mut skipped = Vec::new();
    let updated: Vec<(&Component, Component)> = components
        .iter()
        .map(|component| match rescale(component, quantity) {
            Ok(Some(consumption)) => (component, component.with_consumption(consumption)),
            Ok(None) => {
                skipped.push(SkippedComponent {
                    component_id: component.id(),
                    reason: SkipReason::NoConsumption,
                });
                (component, component.clone())
            }
            Err(reason) => {
                skipped.push(SkippedComponent {
                    component_id: component.id(),
                    reason,
                });
                (component, component.clone())
            }
        })
        .collect();

    let (costed, total) = cost(updated, &rate_of, &mut skipped);
    Recalculation {
        order_quantity: Some(quantity),
        rejected: None,
        components: costed,
        total_material_cost: total,
        skipped,
    }
}

fn rescale(component: &Component, quantity: OrderQuantity) -> Result<Option<Decimal>, SkipReason> {
    match component.basis() {
        ConsumptionBasis::Manual { anchor: None } => Ok(None),
        ConsumptionBasis::Manual {
            anchor: Some(anchor),
        } => anchor
            .per_unit()
            .checked_mul(quantity.value())
            .map(Some)
            .ok_or(SkipReason::Overflow),
        ConsumptionBasis::Calculated { formula } => {
            formula.evaluate(quantity).map(Some).map_err(SkipReason::from)
        }
    }
}

fn unchanged<F>(components: &[Component], rate_of: &F, rejected: QuantityRejected) -> Recalculation
where
    F: Fn(MaterialId) -> Option<Decimal>,
{
    let mut skipped = Vec::new();
    let pairs = components.iter().map(|c| (c, c.clone())).collect();
    let (costed, total) = cost(pairs, rate_of, &mut skipped);
    Recalculation {
        order_quantity: None,
        rejected: Some(rejected),
        components: costed,
        total_material_cost: total,
        skipped,
    }
}

/// Price each `(prior, updated)` pair, falling back to `prior` at zero cost
/// when the updated cost or the running total does not fit a decimal.
fn cost<F>(
    pairs: Vec<(&Component, Component)>,
    rate_of: &F,
    skipped: &mut Vec<SkippedComponent>,
) -> (Vec<CostedComponent>, Decimal)
where
    F: Fn(MaterialId) -> Option<Decimal>,
{
    let mut total = Decimal::ZERO;
    let costed = pairs
        .into_iter()
        .map(|(prior, component)| {
            let rate = component.material_id().and_then(rate_of).unwrap_or_default();
            let priced = component
                .consumption()
                .unwrap_or_default()
                .checked_mul(rate)
                .and_then(|c| total.checked_add(c).map(|t| (c, t)));
            match priced {
                Some((material_cost, running)) => {
                    total = running;
                    CostedComponent {
                        component,
                        material_cost,
                    }
                }
                None => {
                    skipped.retain(|s| s.component_id != prior.id());
                    skipped.push(SkippedComponent {
                        component_id: prior.id(),
                        reason: SkipReason::Overflow,
                    });
                    CostedComponent {
                        component: prior.clone(),
                        material_cost: Decimal::ZERO,
                    }
                }
            }
        })
        .collect();
    (costed, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::ConsumptionFormula;
    use bagforge_core::{ComponentId, OrderId};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn qty(n: u32) -> OrderQuantity {
        OrderQuantity::try_from(n).unwrap()
    }

    fn manual(per_unit: Decimal, material: MaterialId) -> Component {
        Component::manual(
            ComponentId::new(),
            OrderId::new(),
            "cutting",
            Some(material),
            per_unit,
            qty(1),
        )
        .unwrap()
    }

    fn no_rates(_: MaterialId) -> Option<Decimal> {
        None
    }

    #[test]
    fn manual_component_scales_from_anchor() {
        let material = MaterialId::new();
        let c = manual(dec!(3.2), material);

        let r = recalculate(qty(5), &[c], no_rates);
        assert!(r.applied());
        let updated = &r.components[0].component;
        assert_eq!(updated.consumption(), Some(dec!(16.0)));
        assert_eq!(updated.base_consumption(), Some(dec!(3.2)));
    }

    #[test]
    fn repeated_edits_do_not_compound() {
        let c = manual(dec!(3.2), MaterialId::new());

        let first = recalculate(qty(5), &[c], no_rates).into_components();
        let second = recalculate(qty(3), &first, no_rates).into_components();
        let third = recalculate(qty(1), &second, no_rates).into_components();

        assert_eq!(second[0].consumption(), Some(dec!(9.6)));
        assert_eq!(third[0].consumption(), Some(dec!(3.2)));
        assert_eq!(third[0].base_consumption(), Some(dec!(3.2)));
    }

    #[test]
    fn rejected_quantity_is_a_no_op() {
        let c = manual(dec!(3.2), MaterialId::new());
        let before = c.clone();

        for bad in ["0", "-4", "twelve", ""] {
            let r = recalculate(bad, std::slice::from_ref(&c), no_rates);
            assert!(!r.applied(), "{bad:?} should be rejected");
            assert!(r.rejected.is_some());
            assert_eq!(r.components[0].component, before);
        }

        let r = recalculate(f64::NAN, std::slice::from_ref(&c), no_rates);
        assert!(!r.applied());
    }

    #[test]
    fn calculated_component_uses_formula_not_scaling() {
        let c = Component::calculated(
            ComponentId::new(),
            OrderId::new(),
            "fabric",
            Some(MaterialId::new()),
            ConsumptionFormula::RollLength {
                cut_length: dec!(40),
                cut_width: dec!(50),
                roll_width: dec!(110),
            },
        );
        let r = recalculate(qty(4), &[c], no_rates);
        // 2 across, 2 rows of 40cm.
        assert_eq!(r.components[0].component.consumption(), Some(dec!(0.8)));
    }

    #[test]
    fn component_without_consumption_is_skipped_not_failed() {
        let mut record = manual(dec!(1), MaterialId::new()).to_record();
        record.base_consumption = None;
        record.consumption = None;
        let anchorless = Component::from_record(record).unwrap();
        let normal = manual(dec!(2), MaterialId::new());

        let r = recalculate(qty(3), &[anchorless.clone(), normal], no_rates);
        assert!(r.applied());
        assert_eq!(r.skipped.len(), 1);
        assert_eq!(r.skipped[0].component_id, anchorless.id());
        assert_eq!(r.skipped[0].reason, SkipReason::NoConsumption);
        assert_eq!(r.components[0].component.consumption(), None);
        assert_eq!(r.components[1].component.consumption(), Some(dec!(6)));
    }

    #[test]
    fn broken_formula_keeps_prior_consumption() {
        let c = Component::calculated(
            ComponentId::new(),
            OrderId::new(),
            "fabric",
            None,
            ConsumptionFormula::Area {
                length: dec!(-1),
                width: dec!(10),
            },
        );
        let r = recalculate(qty(2), &[c], no_rates);
        assert!(matches!(r.skipped[0].reason, SkipReason::Formula { .. }));
        assert_eq!(r.components[0].component.consumption(), None);
    }

    #[test]
    fn costs_use_material_rates() {
        let fabric = MaterialId::new();
        let ink = MaterialId::new();
        let rates: HashMap<MaterialId, Decimal> =
            [(fabric, dec!(10)), (ink, dec!(2.5))].into_iter().collect();

        let components = [manual(dec!(1.5), fabric), manual(dec!(0.2), ink)];
        let r = recalculate(qty(10), &components, |id| rates.get(&id).copied());

        assert_eq!(r.components[0].material_cost, dec!(150));
        assert_eq!(r.components[1].material_cost, dec!(5));
        assert_eq!(r.total_material_cost, dec!(155));
    }

    #[test]
    fn cost_overflow_keeps_prior_state() {
        let fabric = MaterialId::new();
        let ink = MaterialId::new();
        let big = manual(dec!(1), fabric);
        let small = manual(dec!(2), ink);
        let rate = |id: MaterialId| Some(if id == fabric { dec!(100) } else { dec!(1) });

        let r = recalculate(
            "10000000000000000000000000000",
            &[big.clone(), small],
            rate,
        );
        assert!(r.applied());
        assert_eq!(r.components[0].component, big);
        assert_eq!(r.components[0].material_cost, Decimal::ZERO);
        assert_eq!(r.skipped.len(), 1);
        assert_eq!(r.skipped[0].component_id, big.id());
        assert_eq!(r.skipped[0].reason, SkipReason::Overflow);
        assert_eq!(
            r.components[1].component.consumption(),
            Some(dec!(20000000000000000000000000000))
        );
        assert_eq!(r.total_material_cost, r.components[1].material_cost);
    }

    #[test]
    fn rejected_quantity_with_overflowing_cost_does_not_panic() {
        let mut record = manual(dec!(1), MaterialId::new()).to_record();
        record.consumption = Some(Decimal::MAX);
        let c = Component::from_record(record).unwrap();

        let r = recalculate("0", std::slice::from_ref(&c), |_| Some(dec!(2)));
        assert!(!r.applied());
        assert_eq!(r.components[0].component, c);
        assert_eq!(r.total_material_cost, Decimal::ZERO);
    }

    proptest! {
        /// Scaling by q1 then q2 lands on anchor × q2, whatever q1 was.
        #[test]
        fn manual_scaling_is_idempotent(
            anchor_milli in 1u32..1_000_000u32,
            q1 in 1u32..10_000u32,
            q2 in 1u32..10_000u32,
        ) {
            let anchor = Decimal::new(anchor_milli as i64, 3);
            let c = manual(anchor, MaterialId::new());

            let after_q1 = recalculate(qty(q1), &[c], no_rates).into_components();
            let after_q2 = recalculate(qty(q2), &after_q1, no_rates).into_components();

            prop_assert_eq!(after_q2[0].consumption(), Some(anchor * Decimal::from(q2)));
            prop_assert_eq!(after_q2[0].base_consumption(), Some(anchor));
        }
    }
}
