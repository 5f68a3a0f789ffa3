use std::path::{Path, PathBuf};
use anyhow::Error;
use text_file_merge_sort::generator::Generator;
use text_file_merge_sort::sort::Sort;

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn generate_random(path: &Path, records: usize) -> Result<(), Error> {
    let mut generator = Generator::new(path.to_path_buf(), 32);
    generator.with_tasks(4);
    generator.generate(records)?;
    Ok(())
}

fn sort_lines(input_path: &Path, output_path: &Path, tmp_path: &Path) -> Result<(), Error> {
    let mut text_file = Sort::new(input_path.to_path_buf(), output_path.to_path_buf());
    text_file.with_tasks(4);
    text_file.with_bulk_size(10_000);
    text_file.with_tmp_dir(tmp_path.to_path_buf());
    text_file.sort()?;
    Ok(())
}

// cargo run -r --example sort_text_file
pub fn main() -> Result<(), Error> {
    let random_path = PathBuf::from("./target/random-100000.dat");
    let sorted_path = PathBuf::from("./target/sorted-100000.dat");
    let tmp_path = PathBuf::from("./target/sort-tmp");

    generate_random(&random_path, 100_000)?;
    sort_lines(&random_path, &sorted_path, &tmp_path)?;
    assert!(Sort::new(sorted_path, PathBuf::new()).check()?);

    Ok(())
}
