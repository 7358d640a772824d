pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
pub const LOCAL_BUS_CAPACITY: usize = 256;
pub const BUS_CHAIN_ROUTE: &str = "/api/bus/chain";
pub const BUS_TRANSACTION_ROUTE: &str = "/api/bus/transaction";
