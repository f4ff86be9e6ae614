use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{
    core::{
        decision::{Action, Decision, Plan},
        forecast::{PriceForecast, PricePoint},
    },
    quantity::{cost::Cost, rate::KilowattHourRate},
    simulation::Simulation,
};

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table
}

fn cost_cell(cost: Cost) -> Cell {
    Cell::new(cost).set_alignment(CellAlignment::Right).fg(if cost >= Cost::ONE_CENT {
        Color::Red
    } else if cost <= -Cost::ONE_CENT {
        Color::Green
    } else {
        Color::Reset
    })
}

fn action_cell(decision: Option<&Decision>) -> Cell {
    decision.map_or_else(
        || Cell::new("-").add_attribute(Attribute::Dim),
        |decision| {
            Cell::new(format!("{} {}", decision.action, decision.quantity))
                .fg(decision.action.color())
        },
    )
}

#[must_use]
pub fn build_forecast_table(forecast: &PriceForecast, spike_ratio: f64) -> Table {
    let current_rate = forecast.current_rate();
    let spike_threshold = current_rate * spike_ratio;
    let mut table = new_table();
    table.set_header(vec!["Start", "Purchase", "Sale"]);
    for (index, point) in forecast.iter().enumerate() {
        let is_spike = index != 0
            && point.purchase_rate() > spike_threshold
            && point.purchase_rate() > current_rate;
        let mut start = Cell::new(point.start.format("%a %H:%M"));
        if index == 0 {
            start = start.add_attribute(Attribute::Bold);
        }
        table.add_row(vec![
            start,
            Cell::new(point.purchase_rate()).set_alignment(CellAlignment::Right).fg(
                if is_spike {
                    Color::Red
                } else if point.purchase_rate() < current_rate {
                    Color::Green
                } else {
                    Color::Reset
                },
            ),
            Cell::new(point.sale_rate()).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

#[must_use]
pub fn build_plan_table(
    plan: &Plan,
    price: Option<&PricePoint>,
    p2p_rate: Option<KilowattHourRate>,
) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Action", "Quantity", "Rationale", "Cost"]);
    for decision in plan.iter() {
        table.add_row(vec![
            Cell::new(decision.action).fg(decision.action.color()),
            Cell::new(decision.quantity).set_alignment(CellAlignment::Right),
            Cell::new(decision.rationale),
            price.map_or_else(
                || Cell::new("-").add_attribute(Attribute::Dim),
                |price| cost_cell(decision.cost(price, p2p_rate)),
            ),
        ]);
    }
    table
}

#[must_use]
pub fn build_simulation_table(simulation: &Simulation) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        "Start",
        "Production",
        "Consumption",
        "Purchase",
        "Primary",
        "Secondary",
        "Before",
        "After",
        "Cost",
    ]);
    for step in &simulation.steps {
        table.add_row(vec![
            Cell::new(step.point.start.format("%a %H:%M")),
            Cell::new(step.point.production).set_alignment(CellAlignment::Right),
            Cell::new(step.point.consumption).set_alignment(CellAlignment::Right),
            Cell::new(step.price.purchase_rate()).set_alignment(CellAlignment::Right),
            action_cell(Some(&step.plan.primary)),
            action_cell(step.plan.secondary.as_ref()),
            Cell::new(step.storage_before.stored())
                .set_alignment(CellAlignment::Right)
                .add_attribute(Attribute::Dim),
            Cell::new(step.storage_after.stored()).set_alignment(CellAlignment::Right),
            cost_cell(step.net_cost),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total").add_attribute(Attribute::Bold),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        Cell::new(format!("bought {}", simulation.bought)).fg(Action::Buy.color()),
        Cell::new(format!("sold {}", simulation.sold)).fg(Action::Sell.color()),
        Cell::new(""),
        Cell::new(""),
        cost_cell(simulation.net_cost).add_attribute(Attribute::Bold),
    ]);
    table
}
