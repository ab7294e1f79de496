mod aggregate;
mod significance;

pub use aggregate::aggregate;
pub use significance::{
    CRITICAL_VALUES, INSUFFICIENT_DATA_MESSAGE, chi_squared_statistic, p_value_display,
    p_value_for, test_significance, test_totals,
};
