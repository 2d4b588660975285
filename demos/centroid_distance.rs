//! Example estimating the distance from a vector to the centroid of a set,
//! using only two postselection probabilities.

use qreg::{CentroidQuery, QregError};

fn main() -> Result<(), QregError> {
    env_logger::init();
    println!("--- qreg Example: Distance to a Centroid ---");

    // u = (3, 4) against the single vector 0: the distance is |u| = 5.
    let query = CentroidQuery::new(vec![3.0, 4.0], vec![vec![0.0, 0.0]], 0.02)?;
    report(&query)?;

    // A larger set; shrinking t trades acceptance probability for accuracy.
    let u = vec![1.0, 2.0, 0.5];
    let vs = vec![vec![0.5, 1.0, 0.0], vec![1.5, -1.0, 2.0], vec![0.0, 0.5, 1.0]];
    for t in [0.2, 0.05, 0.01] {
        report(&CentroidQuery::new(u.clone(), vs.clone(), t)?)?;
    }
    Ok(())
}

fn report(query: &CentroidQuery) -> Result<(), QregError> {
    println!(
        "\nM = {}, dimension {}, t = {}",
        query.count(),
        query.dimension(),
        query.time_step()
    );
    println!("  centroid        : {:?}", query.centroid());
    println!("  norm table      : {:?}", query.norm_table());

    let estimate = query.run()?;
    println!("  {}", estimate);
    println!(
        "  classical       : Z = {:.6}, D = {:.6}",
        query.classical_z(),
        query.classical_distance()
    );
    println!(
        "  relative error  : {:.3e}",
        (estimate.d_estimate - query.classical_distance()).abs() / query.classical_distance().max(f64::EPSILON)
    );
    Ok(())
}
