use xdevapi_core::{expr, LockContention, QueryBuilder, Schema};

fn main() -> xdevapi_core::Result<()> {
    let people = Schema::new("test").get_table("people");

    println!("=== XDevAPI table statements ===\n");

    // Select with filtering, grouping and paging
    let select = people
        .select(["name", "count(*) AS total"])?
        .where_("age > :years")?
        .group_by("name")?
        .having("total > 1")?
        .order_by("total desc")?
        .limit(10)?
        .offset(20)?
        .bind("years", 13)?;
    println!("1. Select:");
    println!("   {}", select.to_sql()?);
    println!("   next: {:?}\n", select.valid_operations());

    // Locking read
    let locked = people
        .select_all()
        .where_("name = :name")?
        .lock_exclusive(LockContention::SkipLocked)?
        .bind("name", "jack")?;
    println!("2. Locking select:");
    println!("   {}\n", locked.to_sql()?);

    // Multi-row insert
    let insert = people
        .insert_columns(["name", "age"])?
        .values(("jack", 17))?
        .values(("adam", 15))?;
    println!("3. Insert:");
    println!("   {}\n", insert.to_sql()?);

    // Update with a server-side expression
    let update = people
        .update()
        .set("age", expr("age + 1"))?
        .where_("name = :name")?
        .bind("name", "adam")?;
    println!("4. Update:");
    println!("   {}\n", update.to_sql()?);

    // Delete with ordering and limit
    let delete = people
        .delete()
        .where_("age < :years")?
        .order_by("age")?
        .limit(1)?
        .bind("years", 18)?;
    println!("5. Delete:");
    println!("   {}\n", delete.to_sql()?);

    // State machine errors
    let err = people.select_all().offset(5).unwrap_err();
    println!("6. Invalid chain:");
    println!("   {err}");

    Ok(())
}
