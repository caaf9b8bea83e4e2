//! Benchmark schema provisioning.

use tracing::info;
use veil_types::Table;

use crate::engine::{EngineError, Session};

/// Column definitions per table, in declaration order.
fn columns(table: Table) -> &'static str {
    match table {
        Table::Supplier => {
            "s_suppkey integer, s_name varchar, s_address varchar, s_nationkey integer, \
             s_phone varchar, s_acctbal decimal(15,2), s_comment varchar"
        }
        Table::Part => {
            "p_partkey integer, p_name varchar, p_mfgr varchar, p_brand varchar, \
             p_type varchar, p_size integer, p_container varchar, \
             p_retailprice decimal(15,2), p_comment varchar"
        }
        Table::PartSupp => {
            "ps_partkey integer, ps_suppkey integer, ps_availqty integer, \
             ps_supplycost decimal(15,2), ps_comment varchar"
        }
        Table::Customer => {
            "c_custkey integer, c_name varchar, c_address varchar, c_nationkey integer, \
             c_phone varchar, c_acctbal decimal(15,2), c_mktsegment varchar, c_comment varchar"
        }
        Table::Orders => {
            "o_orderkey integer, o_custkey integer, o_orderstatus varchar, \
             o_totalprice decimal(15,2), o_orderdate date, o_orderpriority varchar, \
             o_clerk varchar, o_shippriority integer, o_comment varchar"
        }
        Table::Lineitem => {
            "l_orderkey integer, l_partkey integer, l_suppkey integer, l_linenumber integer, \
             l_quantity decimal(15,2), l_extendedprice decimal(15,2), l_discount decimal(15,2), \
             l_tax decimal(15,2), l_returnflag varchar, l_linestatus varchar, l_shipdate date, \
             l_commitdate date, l_receiptdate date, l_shipinstruct varchar, l_shipmode varchar, \
             l_comment varchar"
        }
        Table::Nation => {
            "n_nationkey integer, n_name varchar, n_regionkey integer, n_comment varchar"
        }
        Table::Region => "r_regionkey integer, r_name varchar, r_comment varchar",
    }
}

/// DDL creating `table` if it does not exist yet.
pub fn create_table_sql(table: Table) -> String {
    format!("create table if not exists {table} ({})", columns(table))
}

/// Creates every benchmark table that is missing.
pub fn provision(session: &mut dyn Session) -> Result<(), EngineError> {
    for table in Table::ALL {
        session.execute(&create_table_sql(table))?;
    }
    info!(tables = Table::ALL.len(), "Schema provisioned");
    Ok(())
}

const SAMPLE_ROWS: [(Table, &str); 8] = [
    (
        Table::Region,
        "(0, 'AFRICA', 'lar deposits'), (1, 'AMERICA', 'hs use ironic'), \
         (2, 'ASIA', 'ges thrash'), (3, 'EUROPE', 'ly final courts'), \
         (4, 'MIDDLE EAST', 'uickly special')",
    ),
    (
        Table::Nation,
        "(3, 'CANADA', 1, 'eas hang ironic'), (7, 'GERMANY', 3, 'l platelets'), \
         (6, 'FRANCE', 3, 'refully final'), (8, 'INDIA', 2, 'ss excuses'), \
         (20, 'SAUDI ARABIA', 4, 'ts. silent'), (2, 'BRAZIL', 1, 'y alongside')",
    ),
    (
        Table::Supplier,
        "(1, 'Supplier#000000001', 'N kD4on9OM Ipw3,gf0J', 20, '30-918-325-4011', 5755.94, 'each slyly above'), \
         (2, 'Supplier#000000002', '89eJ5ksX3ImxJQBvxObC', 3, '13-768-687-3665', 4032.68, 'Customer Complaints about'), \
         (3, 'Supplier#000000003', 'q1,G3Pj6OjIuUYfUoH18', 7, '17-368-801-5707', 4192.40, 'blithely silent requests'), \
         (4, 'Supplier#000000004', 'Bk7ah4CK8SYQTepEmvMk', 6, '16-236-270-9567', 4641.08, 'riously even requests')",
    ),
    (
        Table::Part,
        "(1, 'forest green lace', 'Manufacturer#1', 'Brand#12', 'PROMO BURNISHED BRASS', 15, 'SM CASE', 901.00, 'ly final'), \
         (2, 'blush thistle green', 'Manufacturer#1', 'Brand#23', 'LARGE BRUSHED BRASS', 1, 'MED BAG', 902.00, 'lar accounts'), \
         (3, 'spring green yellow', 'Manufacturer#4', 'Brand#34', 'STANDARD POLISHED TIN', 21, 'LG BOX', 903.00, 'egular deposits'), \
         (4, 'cornflower chocolate', 'Manufacturer#3', 'Brand#45', 'ECONOMY ANODIZED STEEL', 49, 'WRAP CASE', 904.00, 'p furiously')",
    ),
    (
        Table::PartSupp,
        "(1, 1, 3325, 771.64, 'careful packages'), (1, 2, 8076, 993.49, 'ven ideas'), \
         (2, 3, 3956, 337.09, 'after the fluffily'), (3, 4, 4069, 22.95, 'al foxes'), \
         (4, 1, 8895, 378.49, 'nic accounts')",
    ),
    (
        Table::Customer,
        "(1, 'Customer#000000001', 'IVhzIApeRb', 3, '13-989-741-2988', 711.56, 'BUILDING', 'to the even'), \
         (2, 'Customer#000000002', 'XSTf4,NCwDVaW', 7, '17-768-696-7730', 121.65, 'AUTOMOBILE', 'l accounts'), \
         (3, 'Customer#000000003', 'MG9kdTD2WBHm', 8, '18-719-750-3652', 7498.12, 'AUTOMOBILE', 'deposits eat'), \
         (4, 'Customer#000000004', 'XxVSJsLAGtn', 20, '30-128-319-3901', 2866.83, 'MACHINERY', 'requests')",
    ),
    (
        Table::Orders,
        "(1, 1, 'O', 173665.47, date '1995-03-10', '5-LOW', 'Clerk#000000951', 0, 'nstructions sleep'), \
         (2, 2, 'O', 46929.18, date '1994-01-20', '1-URGENT', 'Clerk#000000880', 0, 'foxes. pending'), \
         (3, 3, 'F', 193846.25, date '1993-10-14', '5-LOW', 'Clerk#000000955', 0, 'sly final accounts'), \
         (4, 1, 'O', 32151.78, date '1995-10-11', '5-LOW', 'Clerk#000000124', 0, 'sits. slyly regular'), \
         (5, 2, 'F', 144659.20, date '1996-07-31', '2-HIGH', 'Clerk#000000925', 0, 'quickly. bold deposits')",
    ),
    (
        Table::Lineitem,
        "(1, 1, 2, 1, 17, 21168.23, 0.04, 0.02, 'N', 'O', date '1995-03-13', date '1995-02-12', date '1995-03-22', 'DELIVER IN PERSON', 'TRUCK', 'egular courts'), \
         (1, 2, 3, 2, 36, 45983.16, 0.09, 0.06, 'N', 'O', date '1995-04-12', date '1995-02-28', date '1995-04-20', 'TAKE BACK RETURN', 'MAIL', 'ly final dependencies'), \
         (2, 3, 4, 1, 38, 44694.46, 0.06, 0.05, 'R', 'F', date '1994-02-02', date '1994-01-14', date '1994-02-05', 'TAKE BACK RETURN', 'SHIP', 'ven requests'), \
         (3, 4, 1, 1, 45, 54058.05, 0.06, 0.00, 'R', 'F', date '1994-02-02', date '1994-01-04', date '1994-02-23', 'NONE', 'AIR', 'ongside of the furiously'), \
         (4, 1, 1, 1, 30, 30690.90, 0.03, 0.08, 'N', 'O', date '1996-01-10', date '1995-12-14', date '1996-01-18', 'DELIVER IN PERSON', 'REG AIR', 'sly final accounts'), \
         (5, 2, 2, 1, 15, 24386.67, 0.02, 0.04, 'A', 'F', date '1996-10-31', date '1996-08-24', date '1996-09-20', 'NONE', 'AIR', 'efully brave')",
    ),
];

/// Loads a handful of rows into empty tables, for demos and tests.
pub fn seed_sample(session: &mut dyn Session) -> Result<(), EngineError> {
    for (table, values) in SAMPLE_ROWS {
        let count = session.query(&format!("select count(*) from {table}"))?;
        let populated = count
            .rows
            .first()
            .and_then(|row| row.first())
            .is_some_and(|value| !matches!(value, crate::engine::Value::Integer(0)));
        if !populated {
            session.execute(&format!("insert into {table} values {values}"))?;
        }
    }
    info!("Sample rows loaded");
    Ok(())
}
