//! The TPC-H query catalog.
//!
//! Each template lists its output items and marks every fragment that
//! depends on one with a guard. Item ids follow the convention
//! `column`, `agg(column)` or `count(table)`.

use veil_types::{QueryId, Table};

use crate::error::TemplateError;
use crate::template::{
    Clause, Column, Guard, QueryTemplate, SelectBlock, Source, Statement, StructuralClass,
    TableRef,
};

const EXT: &str = "sum(l_extendedprice)";
const DISC: &str = "sum(l_discount)";

/// All templates of the benchmark, in query order.
#[derive(Debug, Clone)]
pub struct Catalog {
    templates: Vec<QueryTemplate>,
}

impl Catalog {
    /// Builds the 22 TPC-H templates.
    pub fn tpch() -> Result<Self, TemplateError> {
        let templates = vec![
            q1()?,
            q2()?,
            q3()?,
            q4()?,
            q5()?,
            q6()?,
            q7()?,
            q8()?,
            q9()?,
            q10()?,
            q11()?,
            q12()?,
            q13()?,
            q14()?,
            q15()?,
            q16()?,
            q17()?,
            q18()?,
            q19()?,
            q20()?,
            q21()?,
            q22()?,
        ];
        Ok(Self { templates })
    }

    pub fn get(&self, id: QueryId) -> Option<&QueryTemplate> {
        self.templates.iter().find(|t| t.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryTemplate> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

// ============================================================================
// Builders
// ============================================================================

/// A column governed by the item of the same name.
fn own(expr: &str) -> Column {
    Column::new(expr).guarded(Guard::requires(&[expr]))
}

/// An aliased expression governed by every listed item.
fn agg(expr: &str, alias: &str, items: &[&str]) -> Column {
    Column::new(expr).named(alias).guarded(Guard::requires(items))
}

fn needs(text: &str, items: &[&str]) -> Clause {
    Clause::new(text).guarded(Guard::requires(items))
}

fn aliased(table: Table, alias: &str) -> Source {
    Source::Table(TableRef::new(table).aliased(alias))
}

fn derived(body: SelectBlock, alias: &str) -> Source {
    Source::Derived {
        body: Box::new(body),
        alias: alias.to_string(),
    }
}

fn tables(block: SelectBlock, list: &[Table]) -> SelectBlock {
    list.iter().fold(block, |b, t| b.from_table(*t))
}

fn filters(block: SelectBlock, list: &[&str]) -> SelectBlock {
    list.iter().fold(block, |b, p| b.filter(*p))
}

fn groups(block: SelectBlock, list: &[&str]) -> SelectBlock {
    list.iter().fold(block, |b, g| b.group(*g))
}

fn select(id: u32, class: StructuralClass, items: &[&str], block: SelectBlock) -> Result<QueryTemplate, TemplateError> {
    QueryTemplate::new(id, class, items, vec![Statement::Select(block)])
}

// ============================================================================
// Templates
// ============================================================================

fn q1() -> Result<QueryTemplate, TemplateError> {
    let block = SelectBlock::new()
        .column(own("l_returnflag"))
        .column(own("l_linestatus"))
        .column(agg("sum(l_quantity)", "sum_qty", &["sum(l_quantity)"]))
        .column(agg("sum(l_extendedprice)", "sum_base_price", &[EXT]))
        .column(agg("sum(l_extendedprice * (1 - l_discount))", "sum_disc_price", &[EXT, DISC]))
        .column(agg(
            "sum(l_extendedprice * (1 - l_discount) * (1 + l_tax))",
            "sum_charge",
            &[EXT, DISC, "sum(l_tax)"],
        ))
        .column(agg("avg(l_quantity)", "avg_qty", &["avg(l_quantity)"]))
        .column(agg("avg(l_extendedprice)", "avg_price", &["avg(l_extendedprice)"]))
        .column(agg("avg(l_discount)", "avg_disc", &["avg(l_discount)"]))
        .column(agg("count(*)", "count_order", &["count(lineitem)"]))
        .from_table(Table::Lineitem)
        .filter("l_shipdate <= date '1998-12-01' - interval '90' day")
        .group("l_returnflag")
        .group("l_linestatus")
        .order("l_returnflag")
        .order("l_linestatus");
    select(
        1,
        StructuralClass::Simple,
        &[
            "l_returnflag",
            "l_linestatus",
            "sum(l_quantity)",
            EXT,
            DISC,
            "sum(l_tax)",
            "avg(l_quantity)",
            "avg(l_extendedprice)",
            "avg(l_discount)",
            "count(lineitem)",
        ],
        block,
    )
}

fn q2() -> Result<QueryTemplate, TemplateError> {
    let items = [
        "s_acctbal", "s_name", "n_name", "p_partkey", "p_mfgr", "s_address", "s_phone", "s_comment",
    ];
    let block = items.iter().fold(SelectBlock::new(), |b, i| b.column(own(i)));
    let block = tables(
        block,
        &[Table::Part, Table::Supplier, Table::PartSupp, Table::Nation, Table::Region],
    );
    let block = filters(
        block,
        &[
            "p_partkey = ps_partkey",
            "s_suppkey = ps_suppkey",
            "p_size = 15",
            "p_type like '%BRASS'",
            "s_nationkey = n_nationkey",
            "n_regionkey = r_regionkey",
            "r_name = 'EUROPE'",
            "ps_supplycost = (select min(ps_supplycost) from partsupp, supplier, nation, region \
             where p_partkey = ps_partkey and s_suppkey = ps_suppkey and s_nationkey = n_nationkey \
             and n_regionkey = r_regionkey and r_name = 'EUROPE')",
        ],
    )
    .order("s_acctbal desc")
    .order("n_name")
    .order("s_name")
    .order("p_partkey")
    .limit(100);
    select(2, StructuralClass::ViewBased, &items, block)
}

fn q3() -> Result<QueryTemplate, TemplateError> {
    let block = SelectBlock::new()
        .column(own("l_orderkey"))
        .column(agg("sum(l_extendedprice * (1 - l_discount))", "revenue", &[EXT, DISC]))
        .column(own("o_orderdate"))
        .column(own("o_shippriority"));
    let block = tables(block, &[Table::Customer, Table::Orders, Table::Lineitem]);
    let block = filters(
        block,
        &[
            "c_mktsegment = 'BUILDING'",
            "c_custkey = o_custkey",
            "l_orderkey = o_orderkey",
            "o_orderdate < date '1995-03-15'",
            "l_shipdate > date '1995-03-15'",
        ],
    );
    let block = groups(block, &["l_orderkey", "o_orderdate", "o_shippriority"])
        .order(needs("revenue desc", &[EXT, DISC]))
        .order("o_orderdate")
        .limit(10);
    select(
        3,
        StructuralClass::ViewBased,
        &["l_orderkey", EXT, DISC, "o_orderdate", "o_shippriority"],
        block,
    )
}

fn q4() -> Result<QueryTemplate, TemplateError> {
    let block = SelectBlock::new()
        .column(own("o_orderpriority"))
        .column(agg("count(*)", "order_count", &["count(orders)"]))
        .from_table(Table::Orders);
    let block = filters(
        block,
        &[
            "o_orderdate >= date '1993-07-01'",
            "o_orderdate < date '1993-07-01' + interval '3' month",
            "exists (select * from lineitem where l_orderkey = o_orderkey and l_commitdate < l_receiptdate)",
        ],
    )
    .group("o_orderpriority")
    .order("o_orderpriority");
    select(4, StructuralClass::Simple, &["o_orderpriority", "count(orders)"], block)
}

fn q5() -> Result<QueryTemplate, TemplateError> {
    let block = SelectBlock::new()
        .column(own("n_name"))
        .column(agg("sum(l_extendedprice * (1 - l_discount))", "revenue", &[EXT, DISC]));
    let block = tables(
        block,
        &[
            Table::Customer,
            Table::Orders,
            Table::Lineitem,
            Table::Supplier,
            Table::Nation,
            Table::Region,
        ],
    );
    let block = filters(
        block,
        &[
            "c_custkey = o_custkey",
            "l_orderkey = o_orderkey",
            "l_suppkey = s_suppkey",
            "c_nationkey = s_nationkey",
            "s_nationkey = n_nationkey",
            "n_regionkey = r_regionkey",
            "r_name = 'ASIA'",
            "o_orderdate >= date '1994-01-01'",
            "o_orderdate < date '1994-01-01' + interval '1' year",
        ],
    )
    .group("n_name")
    .order(needs("revenue desc", &[EXT, DISC]));
    select(5, StructuralClass::ViewBased, &["n_name", EXT, DISC], block)
}

fn q6() -> Result<QueryTemplate, TemplateError> {
    let block = SelectBlock::new()
        .column(agg("sum(l_extendedprice * l_discount)", "revenue", &[EXT, DISC]))
        .from_table(Table::Lineitem);
    let block = filters(
        block,
        &[
            "l_shipdate >= date '1994-01-01'",
            "l_shipdate < date '1994-01-01' + interval '1' year",
            "l_discount between 0.06 - 0.01 and 0.06 + 0.01",
            "l_quantity < 24",
        ],
    );
    select(6, StructuralClass::Simple, &[EXT, DISC], block)
}

fn q7() -> Result<QueryTemplate, TemplateError> {
    let body = SelectBlock::new()
        .column(Column::new("n1.n_name").named("supp_nation"))
        .column(Column::new("n2.n_name").named("cust_nation"))
        .column(Column::new("extract(year from l_shipdate)").named("l_year"))
        .column(Column::new("l_extendedprice * (1 - l_discount)").named("volume"));
    let body = tables(body, &[Table::Supplier, Table::Lineitem, Table::Orders, Table::Customer])
        .from(aliased(Table::Nation, "n1"))
        .from(aliased(Table::Nation, "n2"));
    let body = filters(
        body,
        &[
            "s_suppkey = l_suppkey",
            "o_orderkey = l_orderkey",
            "c_custkey = o_custkey",
            "s_nationkey = n1.n_nationkey",
            "c_nationkey = n2.n_nationkey",
            "((n1.n_name = 'FRANCE' and n2.n_name = 'GERMANY') or (n1.n_name = 'GERMANY' and n2.n_name = 'FRANCE'))",
            "l_shipdate between date '1995-01-01' and date '1996-12-31'",
        ],
    );

    let block = SelectBlock::new()
        .column(Column::new("supp_nation").guarded(Guard::requires(&["n_name"])))
        .column(Column::new("cust_nation").guarded(Guard::requires(&["n_name"])))
        .column(Column::new("l_year").guarded(Guard::requires(&["l_shipdate"])))
        .column(agg("sum(volume)", "revenue", &[EXT, DISC]))
        .from(derived(body, "shipping"));
    let block = groups(block, &["supp_nation", "cust_nation", "l_year"])
        .order("supp_nation")
        .order("cust_nation")
        .order("l_year");
    select(7, StructuralClass::Nested, &["n_name", "l_shipdate", EXT, DISC], block)
}

fn q8() -> Result<QueryTemplate, TemplateError> {
    let body = SelectBlock::new()
        .column(Column::new("extract(year from o_orderdate)").named("o_year"))
        .column(Column::new("l_extendedprice * (1 - l_discount)").named("volume"))
        .column(Column::new("n2.n_name").named("nation"));
    let body = tables(
        body,
        &[Table::Part, Table::Supplier, Table::Lineitem, Table::Orders, Table::Customer],
    )
    .from(aliased(Table::Nation, "n1"))
    .from(aliased(Table::Nation, "n2"))
    .from_table(Table::Region);
    let body = filters(
        body,
        &[
            "p_partkey = l_partkey",
            "s_suppkey = l_suppkey",
            "l_orderkey = o_orderkey",
            "o_custkey = c_custkey",
            "c_nationkey = n1.n_nationkey",
            "n1.n_regionkey = r_regionkey",
            "r_name = 'AMERICA'",
            "s_nationkey = n2.n_nationkey",
            "o_orderdate between date '1995-01-01' and date '1996-12-31'",
            "p_type = 'ECONOMY ANODIZED STEEL'",
        ],
    );

    let block = SelectBlock::new()
        .column(Column::new("o_year").guarded(Guard::requires(&["o_orderdate"])))
        .column(agg(
            "sum(case when nation = 'BRAZIL' then volume else 0 end) / sum(volume)",
            "mkt_share",
            &[EXT, DISC],
        ))
        .from(derived(body, "all_nations"))
        .group("o_year")
        .order("o_year");
    select(8, StructuralClass::Nested, &["o_orderdate", EXT, DISC], block)
}

fn q9() -> Result<QueryTemplate, TemplateError> {
    let body = SelectBlock::new()
        .column(Column::new("n_name").named("nation"))
        .column(Column::new("extract(year from o_orderdate)").named("o_year"))
        .column(
            Column::new("l_extendedprice * (1 - l_discount) - ps_supplycost * l_quantity")
                .named("amount"),
        );
    let body = tables(
        body,
        &[
            Table::Part,
            Table::Supplier,
            Table::Lineitem,
            Table::PartSupp,
            Table::Orders,
            Table::Nation,
        ],
    );
    let body = filters(
        body,
        &[
            "s_suppkey = l_suppkey",
            "ps_suppkey = l_suppkey",
            "ps_partkey = l_partkey",
            "p_partkey = l_partkey",
            "o_orderkey = l_orderkey",
            "s_nationkey = n_nationkey",
            "p_name like '%green%'",
        ],
    );

    let block = SelectBlock::new()
        .column(Column::new("nation").guarded(Guard::requires(&["n_name"])))
        .column(Column::new("o_year").guarded(Guard::requires(&["o_orderdate"])))
        .column(agg(
            "sum(amount)",
            "sum_profit",
            &[EXT, DISC, "sum(ps_supplycost)", "sum(l_quantity)"],
        ))
        .from(derived(body, "profit"))
        .group("nation")
        .group("o_year")
        .order("nation")
        .order("o_year desc");
    select(
        9,
        StructuralClass::Nested,
        &["n_name", "o_orderdate", EXT, DISC, "sum(ps_supplycost)", "sum(l_quantity)"],
        block,
    )
}

fn q10() -> Result<QueryTemplate, TemplateError> {
    let block = SelectBlock::new()
        .column(own("c_custkey"))
        .column(own("c_name"))
        .column(agg("sum(l_extendedprice * (1 - l_discount))", "revenue", &[EXT, DISC]))
        .column(own("c_acctbal"))
        .column(own("n_name"))
        .column(own("c_address"))
        .column(own("c_phone"))
        .column(own("c_comment"));
    let block = tables(block, &[Table::Customer, Table::Orders, Table::Lineitem, Table::Nation]);
    let block = filters(
        block,
        &[
            "c_custkey = o_custkey",
            "l_orderkey = o_orderkey",
            "o_orderdate >= date '1993-10-01'",
            "o_orderdate < date '1993-10-01' + interval '3' month",
            "l_returnflag = 'R'",
            "c_nationkey = n_nationkey",
        ],
    );
    let block = groups(
        block,
        &["c_custkey", "c_name", "c_acctbal", "c_phone", "n_name", "c_address", "c_comment"],
    )
    .order(needs("revenue desc", &[EXT, DISC]))
    .limit(20);
    select(
        10,
        StructuralClass::ViewBased,
        &[
            "c_custkey", "c_name", EXT, DISC, "c_acctbal", "n_name", "c_address", "c_phone",
            "c_comment",
        ],
        block,
    )
}

fn q11() -> Result<QueryTemplate, TemplateError> {
    let value_items = ["sum(ps_supplycost)", "sum(ps_availqty)"];
    let block = SelectBlock::new()
        .column(own("ps_partkey"))
        .column(agg("sum(ps_supplycost * ps_availqty)", "value", &value_items));
    let block = tables(block, &[Table::PartSupp, Table::Supplier, Table::Nation]);
    let block = filters(
        block,
        &["ps_suppkey = s_suppkey", "s_nationkey = n_nationkey", "n_name = 'GERMANY'"],
    )
    .group("ps_partkey")
    .having(
        "sum(ps_supplycost * ps_availqty) > (select sum(ps_supplycost * ps_availqty) * 0.0001 \
         from partsupp, supplier, nation where ps_suppkey = s_suppkey \
         and s_nationkey = n_nationkey and n_name = 'GERMANY')",
    )
    .order(needs("value desc", &value_items));
    select(
        11,
        StructuralClass::ViewBased,
        &["ps_partkey", "sum(ps_supplycost)", "sum(ps_availqty)"],
        block,
    )
}

fn q12() -> Result<QueryTemplate, TemplateError> {
    let priority = ["sum(o_orderpriority)"];
    let block = SelectBlock::new()
        .column(own("l_shipmode"))
        .column(agg(
            "sum(case when o_orderpriority = '1-URGENT' or o_orderpriority = '2-HIGH' then 1 else 0 end)",
            "high_line_count",
            &priority,
        ))
        .column(agg(
            "sum(case when o_orderpriority <> '1-URGENT' and o_orderpriority <> '2-HIGH' then 1 else 0 end)",
            "low_line_count",
            &priority,
        ));
    let block = tables(block, &[Table::Orders, Table::Lineitem]);
    let block = filters(
        block,
        &[
            "o_orderkey = l_orderkey",
            "l_shipmode in ('MAIL', 'SHIP')",
            "l_commitdate < l_receiptdate",
            "l_shipdate < l_commitdate",
            "l_receiptdate >= date '1994-01-01'",
            "l_receiptdate < date '1994-01-01' + interval '1' year",
        ],
    )
    .group("l_shipmode")
    .order("l_shipmode");
    select(12, StructuralClass::ViewBased, &["l_shipmode", "sum(o_orderpriority)"], block)
}

fn q13() -> Result<QueryTemplate, TemplateError> {
    let body = SelectBlock::new()
        .column(Column::new("c_custkey"))
        .column(Column::new("count(o_orderkey)").named("c_count"))
        .from(Source::Join {
            left: TableRef::new(Table::Customer),
            kind: "left outer join".to_string(),
            right: TableRef::new(Table::Orders),
            on: "c_custkey = o_custkey and o_comment not like '%special%requests%'".to_string(),
        })
        .group("c_custkey");

    let block = SelectBlock::new()
        .column(Column::new("c_count").guarded(Guard::requires(&["count(o_orderkey)"])))
        .column(agg("count(*)", "custdist", &["count(c_custkey)"]))
        .from(derived(body, "c_orders"))
        .group("c_count")
        .order(needs("custdist desc", &["count(c_custkey)"]))
        .order("c_count desc");
    select(
        13,
        StructuralClass::Nested,
        &["count(o_orderkey)", "count(c_custkey)"],
        block,
    )
}

fn q14() -> Result<QueryTemplate, TemplateError> {
    let block = SelectBlock::new()
        .column(agg(
            "100.00 * sum(case when p_type like 'PROMO%' then l_extendedprice * (1 - l_discount) else 0 end) \
             / sum(l_extendedprice * (1 - l_discount))",
            "promo_revenue",
            &["sum(p_type)", EXT, DISC],
        ))
        .from_table(Table::Lineitem)
        .from_table(Table::Part);
    let block = filters(
        block,
        &[
            "l_partkey = p_partkey",
            "l_shipdate >= date '1995-09-01'",
            "l_shipdate < date '1995-09-01' + interval '1' month",
        ],
    );
    select(14, StructuralClass::ViewBased, &["sum(p_type)", EXT, DISC], block)
}

fn q15() -> Result<QueryTemplate, TemplateError> {
    const SUPPLIER: [&str; 4] = ["s_suppkey", "s_name", "s_address", "s_phone"];

    let revenue = SelectBlock::new()
        .column(agg("l_suppkey", "supplier_no", &["l_suppkey"]))
        .column(agg("sum(l_extendedprice * (1 - l_discount))", "total_revenue", &[EXT, DISC]))
        .from_table(Table::Lineitem)
        .filter("l_shipdate >= date '1996-01-01'")
        .filter("l_shipdate < date '1996-01-01' + interval '3' month")
        .group(needs("l_suppkey", &["l_suppkey"]));

    let top = SUPPLIER.iter().fold(SelectBlock::new(), |b, i| b.column(own(i)));
    let top = top
        .column(Column::new("total_revenue").guarded(Guard::requires(&[EXT, DISC])))
        .from(Source::Table(
            TableRef::new(Table::Supplier).guarded(Guard::any_of(&SUPPLIER)),
        ))
        .from(Source::Relation {
            name: "revenue0".to_string(),
            guard: Guard::none(),
        })
        .filter(
            Clause::new("s_suppkey = supplier_no")
                .guarded(Guard::requires(&["l_suppkey"]).and_any_of(&SUPPLIER)),
        )
        .filter(needs(
            "total_revenue = (select max(total_revenue) from {revenue0})",
            &[EXT, DISC],
        ))
        .order(Clause::new("s_suppkey").guarded(Guard::any_of(&SUPPLIER)));

    QueryTemplate::new(
        15,
        StructuralClass::MultiStatement,
        &["l_suppkey", EXT, DISC, "s_suppkey", "s_name", "s_address", "s_phone"],
        vec![
            Statement::CreateRelation {
                name: "revenue0".to_string(),
                body: revenue,
            },
            Statement::Select(top),
            Statement::DropRelation {
                name: "revenue0".to_string(),
            },
        ],
    )
}

fn q16() -> Result<QueryTemplate, TemplateError> {
    let cnt = ["count(ps_suppkey)"];
    let block = SelectBlock::new()
        .column(own("p_brand"))
        .column(own("p_type"))
        .column(own("p_size"))
        .column(agg("count(distinct ps_suppkey)", "supplier_cnt", &cnt))
        .from_table(Table::PartSupp)
        .from_table(Table::Part);
    let block = filters(
        block,
        &[
            "p_partkey = ps_partkey",
            "p_brand <> 'Brand#45'",
            "p_type not like 'MEDIUM POLISHED%'",
            "p_size in (49, 14, 23, 45, 19, 3, 36, 9)",
            "ps_suppkey not in (select s_suppkey from supplier where s_comment like '%Customer%Complaints%')",
        ],
    );
    let block = groups(block, &["p_brand", "p_type", "p_size"])
        .order(needs("supplier_cnt desc", &cnt))
        .order("p_brand")
        .order("p_type")
        .order("p_size");
    select(
        16,
        StructuralClass::ViewBased,
        &["p_brand", "p_type", "p_size", "count(ps_suppkey)"],
        block,
    )
}

fn q17() -> Result<QueryTemplate, TemplateError> {
    let block = SelectBlock::new()
        .column(agg("sum(l_extendedprice) / 7.0", "avg_yearly", &[EXT]))
        .from_table(Table::Lineitem)
        .from_table(Table::Part);
    let block = filters(
        block,
        &[
            "p_partkey = l_partkey",
            "p_brand = 'Brand#23'",
            "p_container = 'MED BOX'",
            "l_quantity < (select 0.2 * avg(l_quantity) from lineitem where l_partkey = p_partkey)",
        ],
    );
    select(17, StructuralClass::ViewBased, &[EXT], block)
}

fn q18() -> Result<QueryTemplate, TemplateError> {
    let cols = ["c_name", "c_custkey", "o_orderkey", "o_orderdate", "o_totalprice"];
    let block = cols.iter().fold(SelectBlock::new(), |b, c| b.column(own(c)));
    let block = block.column(own("sum(l_quantity)"));
    let block = tables(block, &[Table::Customer, Table::Orders, Table::Lineitem]);
    let block = filters(
        block,
        &[
            "o_orderkey in (select l_orderkey from lineitem group by l_orderkey having sum(l_quantity) > 300)",
            "c_custkey = o_custkey",
            "o_orderkey = l_orderkey",
        ],
    );
    let block = groups(block, &cols)
        .order("o_totalprice desc")
        .order("o_orderdate")
        .limit(100);
    select(
        18,
        StructuralClass::ViewBased,
        &["c_name", "c_custkey", "o_orderkey", "o_orderdate", "o_totalprice", "sum(l_quantity)"],
        block,
    )
}

fn q19() -> Result<QueryTemplate, TemplateError> {
    let block = SelectBlock::new()
        .column(agg("sum(l_extendedprice * (1 - l_discount))", "revenue", &[EXT, DISC]))
        .from_table(Table::Lineitem)
        .from_table(Table::Part)
        .filter(
            "((p_partkey = l_partkey and p_brand = 'Brand#12' \
             and p_container in ('SM CASE', 'SM BOX', 'SM PACK', 'SM PKG') \
             and l_quantity >= 1 and l_quantity <= 1 + 10 and p_size between 1 and 5 \
             and l_shipmode in ('AIR', 'AIR REG') and l_shipinstruct = 'DELIVER IN PERSON') \
             or (p_partkey = l_partkey and p_brand = 'Brand#23' \
             and p_container in ('MED BAG', 'MED BOX', 'MED PKG', 'MED PACK') \
             and l_quantity >= 10 and l_quantity <= 10 + 10 and p_size between 1 and 10 \
             and l_shipmode in ('AIR', 'AIR REG') and l_shipinstruct = 'DELIVER IN PERSON') \
             or (p_partkey = l_partkey and p_brand = 'Brand#34' \
             and p_container in ('LG CASE', 'LG BOX', 'LG PACK', 'LG PKG') \
             and l_quantity >= 20 and l_quantity <= 20 + 10 and p_size between 1 and 15 \
             and l_shipmode in ('AIR', 'AIR REG') and l_shipinstruct = 'DELIVER IN PERSON'))",
        );
    select(19, StructuralClass::ViewBased, &[EXT, DISC], block)
}

fn q20() -> Result<QueryTemplate, TemplateError> {
    let block = SelectBlock::new()
        .column(own("s_name"))
        .column(own("s_address"))
        .from_table(Table::Supplier)
        .from_table(Table::Nation);
    let block = filters(
        block,
        &[
            "s_suppkey in (select ps_suppkey from partsupp where ps_partkey in \
             (select p_partkey from part where p_name like 'forest%') \
             and ps_availqty > (select 0.5 * sum(l_quantity) from lineitem \
             where l_partkey = ps_partkey and l_suppkey = ps_suppkey \
             and l_shipdate >= date '1994-01-01' \
             and l_shipdate < date '1994-01-01' + interval '1' year))",
            "s_nationkey = n_nationkey",
            "n_name = 'CANADA'",
        ],
    )
    .order("s_name");
    select(20, StructuralClass::ViewBased, &["s_name", "s_address"], block)
}

fn q21() -> Result<QueryTemplate, TemplateError> {
    const SUPPLIER: [&str; 2] = ["s_name", "count(supplier)"];
    const COUNTS: [&str; 4] = ["count(supplier)", "count(lineitem)", "count(orders)", "count(nation)"];
    let li = ["count(lineitem)"];
    let ord = ["count(orders)"];
    let nat = ["count(nation)"];

    let block = SelectBlock::new()
        .column(own("s_name"))
        .column(Column::new("count(*)").named("numwait").guarded(Guard::any_of(&COUNTS)))
        .from(Source::Table(
            TableRef::new(Table::Supplier).guarded(Guard::any_of(&SUPPLIER)),
        ))
        .from(Source::Table(
            TableRef::new(Table::Lineitem).aliased("l1").guarded(Guard::requires(&li)),
        ))
        .from(Source::Table(TableRef::new(Table::Orders).guarded(Guard::requires(&ord))))
        .from(Source::Table(TableRef::new(Table::Nation).guarded(Guard::requires(&nat))))
        .filter(Clause::new("s_suppkey = l1.l_suppkey").guarded(Guard::requires(&li).and_any_of(&SUPPLIER)))
        .filter(needs("o_orderkey = l1.l_orderkey", &["count(orders)", "count(lineitem)"]))
        .filter(needs("o_orderstatus = 'F'", &ord))
        .filter(needs("l1.l_receiptdate > l1.l_commitdate", &li))
        .filter(needs(
            "exists (select * from lineitem l2 where l2.l_orderkey = l1.l_orderkey \
             and l2.l_suppkey <> l1.l_suppkey)",
            &li,
        ))
        .filter(needs(
            "not exists (select * from lineitem l3 where l3.l_orderkey = l1.l_orderkey \
             and l3.l_suppkey <> l1.l_suppkey and l3.l_receiptdate > l3.l_commitdate)",
            &li,
        ))
        .filter(Clause::new("s_nationkey = n_nationkey").guarded(Guard::requires(&nat).and_any_of(&SUPPLIER)))
        .filter(needs("n_name = 'SAUDI ARABIA'", &nat))
        .group(Clause::new("s_name").guarded(Guard::any_of(&SUPPLIER)))
        .order(Clause::new("numwait desc").guarded(Guard::any_of(&COUNTS)))
        .order(Clause::new("s_name").guarded(Guard::any_of(&SUPPLIER)))
        .limit(100);
    select(
        21,
        StructuralClass::ViewBased,
        &["s_name", "count(supplier)", "count(lineitem)", "count(orders)", "count(nation)"],
        block,
    )
}

fn q22() -> Result<QueryTemplate, TemplateError> {
    let codes = "('13', '31', '23', '29', '30', '18', '17')";
    let body = SelectBlock::new()
        .column(Column::new("substring(c_phone from 1 for 2)").named("cntrycode"))
        .column(Column::new("c_acctbal"))
        .from_table(Table::Customer)
        .filter(format!("substring(c_phone from 1 for 2) in {codes}").as_str())
        .filter(
            format!(
                "c_acctbal > (select avg(c_acctbal) from customer where c_acctbal > 0.00 \
                 and substring(c_phone from 1 for 2) in {codes})"
            )
            .as_str(),
        )
        .filter("not exists (select * from orders where o_custkey = c_custkey)");

    let block = SelectBlock::new()
        .column(Column::new("cntrycode").guarded(Guard::requires(&["c_phone"])))
        .column(agg("count(*)", "numcust", &["count(customer)"]))
        .column(agg("sum(c_acctbal)", "totacctbal", &["sum(c_acctbal)"]))
        .from(derived(body, "custsale"))
        .group("cntrycode")
        .order("cntrycode");
    select(
        22,
        StructuralClass::Nested,
        &["c_phone", "count(customer)", "sum(c_acctbal)"],
        block,
    )
}
