use anyhow::Result;

fn main() -> Result<()> {
    entity_directory::run()
}
