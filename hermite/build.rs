#[cfg(feature = "gpu")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use spirv_builder::{Capability, MetadataPrintout, SpirvBuilder};

    SpirvBuilder::new("../shaders", "spirv-unknown-spv1.3")
        .capability(Capability::Float64)
        .print_metadata(MetadataPrintout::Full)
        .build()?;
    Ok(())
}

#[cfg(not(feature = "gpu"))]
fn main() {}
