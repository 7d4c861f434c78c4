pub mod market_data;
pub mod sync_state;

pub use market_data::{
    NewCashflowRow, NewDailyRow, NewDividendRow, NewEtfBasicRow, NewEtfDailyRow, NewIncomeRow,
    NewIndexBasicRow, NewIndexDailyRow, NewIndexValuationRow, NewIndexWeeklyRow,
    NewIndexWeightRow, NewMemberRow, NewSectorDailyRow, NewSectorIndexRow, NewStockBasicRow,
    NewWeeklyRow,
};
pub use sync_state::SyncStateRow;
