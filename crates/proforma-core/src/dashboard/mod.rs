//! Dashboard KPIs over the generated statements.

pub mod kpis;

pub use kpis::{
    base_year_index, calculate_dashboard, dashboard_kpis, ChartData, DashboardKpis,
    DashboardReport,
};
