//! Linearized AC power flow around the slack voltage.
//!
//! Bus voltages are linear in the net injections through the impedance
//! matrix. Branch currents follow from voltage differences and the
//! admittance matrix. Squared currents are variables held above tangent cuts,
//! so losses are an outer approximation that the objective pulls tight. The
//! voltage band and current limits are polygons inscribed in their circles.

use super::matrices::{Impedance, NetworkTables};
use crate::context::{BalanceTerm, ModelContext, OutputSeries};
use crate::error::ModelResult;
use dopt_core::config::NetworkSettings;
use dopt_core::DoptError;
use dopt_solver_common::{LinearExpr, VarId};
use num_complex::Complex64;
use std::f64::consts::{PI, SQRT_2};
use tracing::debug;

/// Points `k·cap/4` for `k = -4..=4` where squared currents get a tangent.
const TANGENT_POINTS: i32 = 4;

/// `tan(acos(pf))`, the reactive power drawn per unit of real power.
pub fn reactive_ratio(pf: f64) -> f64 {
    pf.acos().tan()
}

/// Half-plane bounded by the chord from `p1` to `p2` of an origin-centered
/// circle: `(a, b, c)` with `a·x + b·y <= c` holding on the origin side.
fn chord(p1: Complex64, p2: Complex64) -> (f64, f64, f64) {
    let mid = (p1 + p2) * 0.5;
    (mid.re, mid.im, mid.re * p1.re + mid.im * p1.im)
}

fn validate(settings: &NetworkSettings) -> Result<(), DoptError> {
    let pf = &settings.power_factors;
    for (key, value) in [
        ("load", pf.load),
        ("batteryCharging", pf.battery_charging),
        ("batteryDischarging", pf.battery_discharging),
        ("genset", pf.genset),
        ("pv", pf.pv),
    ] {
        if !(value > 0.0 && value <= 1.0) {
            return Err(DoptError::config(
                format!("network.settings.powerFactors.{}", key),
                "must lie in (0, 1]",
            ));
        }
    }
    if settings.slack_bus_voltage <= 0.0 {
        return Err(DoptError::config("network.settings.slackBusVoltage", "must be positive"));
    }
    if settings.n_edges < 3 {
        return Err(DoptError::config("network.settings.nEdges", "needs at least 3 edges"));
    }
    if settings.theta_min > settings.theta_max {
        return Err(DoptError::config("network.settings.thetaMin", "exceeds thetaMax"));
    }
    Ok(())
}

/// One DER class's reactive injection at a node.
struct ReactiveSource {
    label: &'static str,
    enabled: bool,
    term: BalanceTerm,
    ratio: f64,
    max_s: f64,
}

struct NodeInjection {
    p_net: LinearExpr,
    q_net: LinearExpr,
    var_grid: VarId,
}

pub fn build_power_flow(ctx: &mut ModelContext, tables: &NetworkTables, settings: &NetworkSettings) -> ModelResult<()> {
    validate(settings)?;
    let nodes = ctx.nodes();
    let slack = tables.require_slack(nodes).map_err(DoptError::from)?;
    let z = tables.impedance(slack).map_err(DoptError::from)?;
    let v0 = settings.slack_bus_voltage;

    // Injection and absorption are free; the network balance closes them.
    ctx.release(BalanceTerm::PowerInjected);
    ctx.release(BalanceTerm::PowerAbsorbed);

    let mut voltage_re = vec![Vec::with_capacity(ctx.steps()); nodes.len()];
    let mut voltage_im = vec![Vec::with_capacity(ctx.steps()); nodes.len()];
    let mut var_grid = vec![Vec::with_capacity(ctx.steps()); nodes.len()];
    let mut loss_profile = Vec::with_capacity(ctx.steps());

    for t in ctx.grid.steps() {
        let injections: Vec<NodeInjection> = (0..nodes.len())
            .map(|n| add_reactive(ctx, settings, n, t))
            .collect();
        let (vre, vim) = add_voltages(ctx, &z, &injections, slack, v0, t);
        let (loss_re, loss_im) = add_branches(ctx, tables, settings, &vre, &vim, t);

        let p_total = LinearExpr::sum(injections.iter().map(|i| &i.p_net));
        let q_total = LinearExpr::sum(injections.iter().map(|i| &i.q_net));
        ctx.lp.eq(format!("network_balance_real[{}]", t), p_total, loss_re.clone());
        ctx.lp.eq(format!("network_balance_imag[{}]", t), q_total, loss_im);

        if settings.enable_volt_const {
            add_voltage_band(ctx, settings, &vre, &vim, t);
        }
        for (n, inj) in injections.iter().enumerate() {
            voltage_re[n].push(LinearExpr::from(vre[n]));
            voltage_im[n].push(LinearExpr::from(vim[n]));
            var_grid[n].push(LinearExpr::from(inj.var_grid));
        }
        loss_profile.push(loss_re * 1000.0);
    }

    let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    ctx.record("voltage_real", OutputSeries::Indexed(ids.iter().cloned().zip(voltage_re).collect()));
    ctx.record("voltage_imag", OutputSeries::Indexed(ids.iter().cloned().zip(voltage_im).collect()));
    ctx.record("var_grid", OutputSeries::Indexed(ids.into_iter().zip(var_grid).collect()));
    ctx.record("network_losses_real", OutputSeries::Time(loss_profile));
    debug!(
        nodes = nodes.len(),
        branches = tables.upper_pairs().len(),
        "power flow constraints added"
    );
    Ok(())
}

fn add_reactive(ctx: &mut ModelContext, settings: &NetworkSettings, n: usize, t: usize) -> NodeInjection {
    let node = &ctx.nodes()[n];
    let config = ctx.config;
    let pf = &settings.power_factors;
    let pcc = if node.is_pcc { 1.0 } else { 0.0 };

    let grid = ctx.lp.free(format!("var_grid[{},{}]", node.id, t));
    ctx.lp
        .le(format!("var_grid_import[{},{}]", node.id, t), grid, pcc * config.site.import_max);
    ctx.lp.ge(
        format!("var_grid_export[{},{}]", node.id, t),
        grid,
        -pcc * config.site.export_max,
    );

    let battery_s: f64 = config
        .batteries
        .enabled()
        .map(|list| list.iter().filter(|b| node.batteries.contains(&b.name)).map(|b| b.max_s).sum())
        .unwrap_or(0.0);
    let genset_s: f64 = config
        .gensets
        .enabled()
        .map(|fleet| fleet.gensets.iter().filter(|g| node.gensets.contains(&g.name)).map(|g| g.max_s).sum())
        .unwrap_or(0.0);
    let sources = [
        ReactiveSource {
            label: "var_pv",
            enabled: config.pv,
            term: BalanceTerm::Pv,
            ratio: reactive_ratio(pf.pv),
            max_s: node.pv_max_s,
        },
        ReactiveSource {
            label: "var_battery",
            enabled: config.batteries.is_enabled(),
            term: BalanceTerm::BatteryDischarge,
            ratio: reactive_ratio(pf.battery_discharging),
            max_s: battery_s,
        },
        ReactiveSource {
            label: "var_genset",
            enabled: config.gensets.is_enabled(),
            term: BalanceTerm::Genset,
            ratio: reactive_ratio(pf.genset),
            max_s: genset_s,
        },
    ];

    let mut provided = LinearExpr::from(grid);
    for source in &sources {
        let q = ctx.lp.free(format!("{}[{},{}]", source.label, node.id, t));
        provided += q;
        if !source.enabled {
            ctx.lp.fix(q, 0.0);
            continue;
        }
        let p = ctx.term(source.term, n, t);
        if !node.is_slack {
            ctx.lp
                .eq(format!("{}_pf[{},{}]", source.label, node.id, t), q, p * source.ratio);
        }
        if settings.enable_gen_pq_limit {
            let s = source.max_s;
            ctx.lp
                .le(format!("{}_pq_plus[{},{}]", source.label, node.id, t), p + q, SQRT_2 * s);
            ctx.lp
                .le(format!("{}_pq_minus[{},{}]", source.label, node.id, t), p - q, SQRT_2 * s);
            ctx.lp.le(format!("{}_q_max[{},{}]", source.label, node.id, t), q, s);
            ctx.lp.ge(format!("{}_q_min[{},{}]", source.label, node.id, t), q, -s);
        }
    }

    let consumed = ctx.term(BalanceTerm::LoadServed, n, t) * reactive_ratio(pf.load)
        + ctx.term(BalanceTerm::BatteryCharge, n, t) * reactive_ratio(pf.battery_charging);
    let injected = ctx.term(BalanceTerm::PowerInjected, n, t);
    let absorbed = ctx.term(BalanceTerm::PowerAbsorbed, n, t);

    NodeInjection {
        p_net: (injected - absorbed) * 1e-3,
        q_net: (provided - consumed) * 1e-3,
        var_grid: grid,
    }
}

fn add_voltages(
    ctx: &mut ModelContext,
    z: &Impedance,
    injections: &[NodeInjection],
    slack: usize,
    v0: f64,
    t: usize,
) -> (Vec<VarId>, Vec<VarId>) {
    let nodes = ctx.nodes();
    let mut vre = Vec::with_capacity(nodes.len());
    let mut vim = Vec::with_capacity(nodes.len());
    for (n, node) in nodes.iter().enumerate() {
        let re = ctx
            .lp
            .continuous(format!("voltage_real[{},{}]", node.id, t), 0.0, f64::INFINITY);
        let im = ctx.lp.free(format!("voltage_imag[{},{}]", node.id, t));
        if n == slack {
            ctx.lp.fix(re, v0);
            ctx.lp.fix(im, 0.0);
        } else {
            let mut re_rhs = LinearExpr::constant(v0);
            let mut im_rhs = LinearExpr::new();
            for (m, inj) in injections.iter().enumerate() {
                if m == slack {
                    continue;
                }
                re_rhs += (inj.p_net.clone() * z.re[n][m] + inj.q_net.clone() * z.im[n][m]) * (1.0 / v0);
                im_rhs += (inj.p_net.clone() * z.im[n][m] - inj.q_net.clone() * z.re[n][m]) * (1.0 / v0);
            }
            ctx.lp
                .eq(format!("voltage_real_def[{},{}]", node.id, t), re, re_rhs);
            ctx.lp
                .eq(format!("voltage_imag_def[{},{}]", node.id, t), im, im_rhs);
        }
        vre.push(re);
        vim.push(im);
    }
    (vre, vim)
}

/// Branch currents, squared-current cuts and the current polygon. Returns
/// the real and reactive loss expressions summed over branches.
fn add_branches(
    ctx: &mut ModelContext,
    tables: &NetworkTables,
    settings: &NetworkSettings,
    vre: &[VarId],
    vim: &[VarId],
    t: usize,
) -> (LinearExpr, LinearExpr) {
    let ids = &tables.node_ids;
    let losses_on = if settings.enable_losses { 1.0 } else { 0.0 };
    let mut loss_re = LinearExpr::new();
    let mut loss_im = LinearExpr::new();

    for (i, j) in tables.upper_pairs() {
        let tag = format!("{},{},{}", ids[i], ids[j], t);
        let (g, b) = (tables.g(i, j), tables.b(i, j));
        let ire = ctx.lp.free(format!("current_real[{}]", tag));
        let iim = ctx.lp.free(format!("current_imag[{}]", tag));
        let d_re = vre[i] - vre[j];
        let d_im = vim[i] - vim[j];
        ctx.lp.eq(
            format!("current_real_def[{}]", tag),
            ire,
            d_re.clone() * -g + d_im.clone() * b,
        );
        ctx.lp
            .eq(format!("current_imag_def[{}]", tag), iim, d_re * -b - d_im * g);

        let cap = tables.current_capacity[i][j];
        let sq_re = ctx.lp.nonneg(format!("current_real_sq[{}]", tag));
        let sq_im = ctx.lp.nonneg(format!("current_imag_sq[{}]", tag));
        for k in -TANGENT_POINTS..=TANGENT_POINTS {
            if cap <= 0.0 && k != 0 {
                continue;
            }
            let a = cap * k as f64 / TANGENT_POINTS as f64;
            ctx.lp.ge(
                format!("current_real_sq_cut[{},{}]", tag, k),
                sq_re,
                LinearExpr::constant(-a * a) + ire * (2.0 * a),
            );
            ctx.lp.ge(
                format!("current_imag_sq_cut[{},{}]", tag, k),
                sq_im,
                LinearExpr::constant(-a * a) + iim * (2.0 * a),
            );
        }
        loss_re += (sq_re + sq_im) * (losses_on * tables.branch_r[i][j]);
        loss_im += (sq_re + sq_im) * (losses_on * tables.branch_x[i][j]);

        if settings.enable_cur_const && cap > 0.0 {
            let step = 2.0 * PI / settings.n_edges as f64;
            for k in 1..=settings.n_edges {
                let p1 = Complex64::from_polar(cap, (k - 1) as f64 * step);
                let p2 = Complex64::from_polar(cap, k as f64 * step);
                let (a, b_coef, c) = chord(p1, p2);
                ctx.lp
                    .le(format!("current_polygon[{},{}]", tag, k), ire * a + iim * b_coef, c);
            }
        }
    }
    (loss_re, loss_im)
}

fn add_voltage_band(ctx: &mut ModelContext, settings: &NetworkSettings, vre: &[VarId], vim: &[VarId], t: usize) {
    let (th_min, th_max) = (settings.theta_min, settings.theta_max);
    let v_max = settings.volt_max;
    let v_min = if settings.conservative_volt_min {
        settings.volt_min / ((th_min.abs() + th_min.abs()) / 2.0).cos()
    } else {
        settings.volt_min
    };

    let inner = chord(Complex64::from_polar(v_min, th_min), Complex64::from_polar(v_min, th_max));
    let upper = chord(Complex64::new(v_max, 0.0), Complex64::from_polar(v_max, th_max));
    let lower = chord(Complex64::from_polar(v_max, th_min), Complex64::new(v_max, 0.0));

    let nodes = ctx.nodes();
    for (n, node) in nodes.iter().enumerate() {
        let tag = format!("{},{}", node.id, t);
        let (re, im) = (vre[n], vim[n]);
        ctx.lp
            .ge(format!("voltage_min[{}]", tag), re * inner.0 + im * inner.1, inner.2);
        ctx.lp
            .le(format!("voltage_max_upper[{}]", tag), re * upper.0 + im * upper.1, upper.2);
        ctx.lp
            .le(format!("voltage_max_lower[{}]", tag), re * lower.0 + im * lower.1, lower.2);
        ctx.lp
            .le(format!("voltage_angle_max[{}]", tag), im - re * th_max.tan(), 0.0);
        ctx.lp
            .ge(format!("voltage_angle_min[{}]", tag), im - re * th_min.tan(), 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unity_power_factor_draws_no_vars() {
        assert!(reactive_ratio(1.0).abs() < 1e-12);
        assert!((reactive_ratio(0.8) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_chord_keeps_inscribed_side() {
        let (a, b, c) = chord(Complex64::new(1.0, 0.0), Complex64::new(0.0, 1.0));
        assert!(a * 0.0 + b * 0.0 <= c);
        assert!(a * 0.5 + b * 0.5 <= c + 1e-12);
        assert!(a * 0.9 + b * 0.9 > c);
    }

    #[test]
    fn test_flat_voltage_inside_band() {
        let s = NetworkSettings::default();
        let inner = chord(Complex64::from_polar(s.volt_min, s.theta_min), Complex64::from_polar(s.volt_min, s.theta_max));
        let upper = chord(Complex64::new(s.volt_max, 0.0), Complex64::from_polar(s.volt_max, s.theta_max));
        let lower = chord(Complex64::from_polar(s.volt_max, s.theta_min), Complex64::new(s.volt_max, 0.0));
        assert!(inner.0 * 1.0 >= inner.2);
        assert!(upper.0 * 1.0 <= upper.2);
        assert!(lower.0 * 1.0 <= lower.2);
        // 0.5 pu violates the minimum, 1.2 pu the maximum
        assert!(inner.0 * 0.5 < inner.2);
        assert!(upper.0 * 1.2 > upper.2);
    }

    #[test]
    fn test_invalid_power_factor_rejected() {
        let mut s = NetworkSettings::default();
        s.power_factors.pv = 0.0;
        assert!(validate(&s).is_err());
        s.power_factors.pv = 1.0;
        s.n_edges = 2;
        assert!(validate(&s).is_err());
    }
}
