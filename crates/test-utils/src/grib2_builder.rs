//! Synthetic GRIB2 message builder.
//!
//! Produces structurally valid GRIB2 edition 2 messages with a template 3.0
//! lat/lon grid, template 4.0 product definition and 16-bit simple packing
//! (template 5.0) or PNG packing (template 5.41). Messages can be
//! concatenated to form a multi-message file.

use crate::fixtures::grid::GridSpec;

/// Build a single GRIB2 message.
#[derive(Debug, Clone)]
pub struct Grib2Builder {
    discipline: u8,
    center: u16,
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    // Grid definition
    ni: u32,
    nj: u32,
    la1: i32,
    lo1: i32,
    la2: i32,
    lo2: i32,
    di: u32,
    dj: u32,
    scanning_mode: u8,
    // Product definition
    product_template: u16,
    param_category: u8,
    param_number: u8,
    level_type: u8,
    level_scale: i8,
    level_value: u32,
    forecast_hour: u32,
    // Data, in scan order. NaN marks a point masked out by the bitmap.
    data_values: Vec<f32>,
    use_bitmap: bool,
    png_packing: bool,
}

impl Grib2Builder {
    /// A GFS-like message: 2 m temperature on a small 10x10 grid.
    pub fn new_gfs() -> Self {
        let ni = 10;
        let nj = 10;
        Self {
            discipline: 0,
            center: 7, // NCEP
            year: 2024,
            month: 1,
            day: 15,
            hour: 12,
            ni,
            nj,
            la1: 45_000_000,
            lo1: 230_000_000,
            la2: 36_000_000,
            lo2: 239_000_000,
            di: 1_000_000,
            dj: 1_000_000,
            scanning_mode: 0, // +i, -j, i consecutive
            product_template: 0,
            param_category: 0,
            param_number: 0, // TMP
            level_type: 103,
            level_scale: 0,
            level_value: 2,
            forecast_hour: 0,
            data_values: vec![288.15; (ni * nj) as usize],
            use_bitmap: false,
            png_packing: false,
        }
    }

    /// Global grid from 90N to 90S, 0E eastwards, rows scanned north to south.
    pub fn with_global_grid(mut self, grid: &GridSpec) -> Self {
        let res = grid.resolution_microdegrees();
        self.ni = grid.nlon as u32;
        self.nj = grid.nlat as u32;
        self.la1 = 90_000_000;
        self.la2 = -90_000_000;
        self.lo1 = 0;
        self.lo2 = (grid.nlon as u32 - 1) as i32 * res as i32;
        self.di = res;
        self.dj = res;
        self.scanning_mode = 0;
        self.data_values = vec![0.0; grid.size()];
        self
    }

    pub fn with_reference_time(mut self, year: u16, month: u8, day: u8, hour: u8) -> Self {
        self.year = year;
        self.month = month;
        self.day = day;
        self.hour = hour;
        self
    }

    pub fn with_grid(mut self, ni: u32, nj: u32) -> Self {
        self.ni = ni;
        self.nj = nj;
        self.data_values = vec![0.0; (ni * nj) as usize];
        self
    }

    /// Override first/last latitude (microdegrees) without touching the data.
    pub fn with_latitudes(mut self, la1: i32, la2: i32) -> Self {
        self.la1 = la1;
        self.la2 = la2;
        self
    }

    pub fn with_scanning_mode(mut self, flags: u8) -> Self {
        self.scanning_mode = flags;
        self
    }

    /// Product definition template number written to section 4. The body
    /// keeps the template 4.0 layout.
    pub fn with_product_template(mut self, template: u16) -> Self {
        self.product_template = template;
        self
    }

    /// Pack section 7 as a 16-bit greyscale PNG (template 5.41).
    pub fn with_png_packing(mut self) -> Self {
        self.png_packing = true;
        self
    }

    pub fn with_parameter(mut self, category: u8, number: u8) -> Self {
        self.param_category = category;
        self.param_number = number;
        self
    }

    pub fn with_level(mut self, level_type: u8, level_value: u32) -> Self {
        self.level_type = level_type;
        self.level_scale = 0;
        self.level_value = level_value;
        self
    }

    /// Level encoded as `scaled_value / 10^scale`.
    pub fn with_scaled_level(mut self, level_type: u8, scale: i8, scaled_value: u32) -> Self {
        self.level_type = level_type;
        self.level_scale = scale;
        self.level_value = scaled_value;
        self
    }

    /// Isobaric level given in hPa; stored in Pa.
    pub fn with_pressure_level(self, hpa: u32) -> Self {
        self.with_level(100, hpa * 100)
    }

    pub fn with_forecast_hour(mut self, hour: u32) -> Self {
        self.forecast_hour = hour;
        self
    }

    pub fn with_constant_value(mut self, value: f32) -> Self {
        self.data_values = vec![value; (self.ni * self.nj) as usize];
        self
    }

    pub fn with_gradient(mut self, min_val: f32, max_val: f32) -> Self {
        let n = (self.ni * self.nj) as usize;
        self.data_values = (0..n)
            .map(|i| min_val + (max_val - min_val) * (i as f32 / n as f32))
            .collect();
        self
    }

    /// Values in scan order. NaN entries are written as bitmap-missing points.
    pub fn with_data(mut self, data: Vec<f32>) -> Self {
        self.use_bitmap = data.iter().any(|v| v.is_nan());
        self.data_values = data;
        self
    }

    /// Build the complete GRIB2 message bytes
    pub fn build(&self) -> Vec<u8> {
        let section1 = self.build_section1();
        let section3 = self.build_section3();
        let section4 = self.build_section4();
        let section5 = self.build_section5();
        let section6 = self.build_section6();
        let section7 = self.build_section7();

        let message_length = 16
            + section1.len()
            + section3.len()
            + section4.len()
            + section5.len()
            + section6.len()
            + section7.len()
            + 4;

        let mut message = Vec::with_capacity(message_length);

        // Section 0: Indicator
        message.extend_from_slice(b"GRIB");
        message.extend_from_slice(&[0, 0]);
        message.push(self.discipline);
        message.push(2);
        message.extend_from_slice(&(message_length as u64).to_be_bytes());

        message.extend_from_slice(&section1);
        message.extend_from_slice(&section3);
        message.extend_from_slice(&section4);
        message.extend_from_slice(&section5);
        message.extend_from_slice(&section6);
        message.extend_from_slice(&section7);

        // Section 8: End
        message.extend_from_slice(b"7777");

        message
    }

    fn build_section1(&self) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(1);

        section.extend_from_slice(&self.center.to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Sub-center
        section.push(2); // Master table version
        section.push(1); // Local table version
        section.push(0); // Significance of reference time (analysis)

        section.extend_from_slice(&self.year.to_be_bytes());
        section.push(self.month);
        section.push(self.day);
        section.push(self.hour);
        section.push(0);
        section.push(0);

        section.push(0); // Operational products
        section.push(0); // Analysis products

        section
    }

    fn build_section3(&self) -> Vec<u8> {
        let mut section = Vec::new();
        let section_length: u32 = 14 + 58;

        section.extend_from_slice(&section_length.to_be_bytes());
        section.push(3);

        section.push(0); // Source of grid definition
        section.extend_from_slice(&(self.ni * self.nj).to_be_bytes());
        section.push(0);
        section.push(0);
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 3.0

        section.push(6); // Shape of Earth (spherical, radius 6371229m)
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());

        section.extend_from_slice(&self.ni.to_be_bytes());
        section.extend_from_slice(&self.nj.to_be_bytes());
        section.extend_from_slice(&0u32.to_be_bytes()); // Basic angle
        section.extend_from_slice(&0xFFFFFFFFu32.to_be_bytes()); // Subdivisions

        section.extend_from_slice(&sign_magnitude(self.la1).to_be_bytes());
        section.extend_from_slice(&sign_magnitude(self.lo1).to_be_bytes());
        section.push(48); // Resolution and component flags
        section.extend_from_slice(&sign_magnitude(self.la2).to_be_bytes());
        section.extend_from_slice(&sign_magnitude(self.lo2).to_be_bytes());
        section.extend_from_slice(&self.di.to_be_bytes());
        section.extend_from_slice(&self.dj.to_be_bytes());
        section.push(self.scanning_mode);

        section
    }

    fn build_section4(&self) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&34u32.to_be_bytes());
        section.push(4);

        section.extend_from_slice(&0u16.to_be_bytes()); // Number of coordinate values
        section.extend_from_slice(&self.product_template.to_be_bytes());

        section.push(self.param_category);
        section.push(self.param_number);
        section.push(0); // Type of generating process (analysis)
        section.push(0);
        section.push(81); // Generating process (GFS)
        section.extend_from_slice(&0u16.to_be_bytes());
        section.push(0);
        section.push(1); // Time range unit (hours)
        section.extend_from_slice(&self.forecast_hour.to_be_bytes());

        section.push(self.level_type);
        section.push(sign_magnitude_i8(self.level_scale));
        section.extend_from_slice(&self.level_value.to_be_bytes());

        section.push(255); // No second fixed surface
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());

        section
    }

    fn present_values(&self) -> Vec<f32> {
        self.data_values
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .collect()
    }

    /// Reference value, binary scale factor and bits per value for 16-bit packing.
    fn packing_parameters(&self) -> (f32, i16, u8) {
        let (min_val, max_val) = self.present_values().iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY),
            |(min, max), &v| (min.min(v), max.max(v)),
        );
        if !min_val.is_finite() {
            return (0.0, 0, 0);
        }

        let range = max_val - min_val;
        if range == 0.0 {
            return (min_val, 0, 0);
        }

        // range = 65535 * 2^E
        let binary_scale_factor = (range as f64 / 65535.0).log2().ceil() as i16;
        (min_val, binary_scale_factor, 16)
    }

    fn build_section5(&self) -> Vec<u8> {
        let mut section = Vec::new();
        let (reference_value, binary_scale_factor, bits_per_value) = self.packing_parameters();

        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(5);

        section.extend_from_slice(&(self.present_values().len() as u32).to_be_bytes());
        let template: u16 = if self.png_packing { 41 } else { 0 };
        section.extend_from_slice(&template.to_be_bytes());

        section.extend_from_slice(&reference_value.to_be_bytes());
        section.extend_from_slice(&sign_magnitude_i16(binary_scale_factor).to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Decimal scale factor
        section.push(bits_per_value);
        section.push(0); // Original field type (floating point)

        section
    }

    fn build_section6(&self) -> Vec<u8> {
        let mut section = Vec::new();

        if !self.use_bitmap {
            section.extend_from_slice(&6u32.to_be_bytes());
            section.push(6);
            section.push(255); // No bitmap
            return section;
        }

        let mut bitmap = vec![0u8; self.data_values.len().div_ceil(8)];
        for (i, v) in self.data_values.iter().enumerate() {
            if !v.is_nan() {
                bitmap[i / 8] |= 0x80 >> (i % 8);
            }
        }

        section.extend_from_slice(&(6 + bitmap.len() as u32).to_be_bytes());
        section.push(6);
        section.push(0); // Bitmap follows
        section.extend_from_slice(&bitmap);
        section
    }

    fn build_section7(&self) -> Vec<u8> {
        let packed_data = if self.png_packing {
            self.pack_png()
        } else {
            self.pack_simple()
        };

        let mut section = Vec::new();
        section.extend_from_slice(&(5 + packed_data.len() as u32).to_be_bytes());
        section.push(7);
        section.extend_from_slice(&packed_data);
        section
    }

    fn pack_simple(&self) -> Vec<u8> {
        let (reference_value, binary_scale_factor, bits_per_value) = self.packing_parameters();
        if bits_per_value == 0 {
            return Vec::new();
        }

        let binary_scale = 2.0_f64.powi(binary_scale_factor as i32);
        let mut packed = Vec::new();
        for val in self.present_values() {
            let scaled = ((val as f64 - reference_value as f64) / binary_scale).round();
            let packed_value = scaled.clamp(0.0, 65535.0) as u16;
            packed.extend_from_slice(&packed_value.to_be_bytes());
        }
        packed
    }

    /// One row of 16-bit greyscale samples holding the simple-packed values.
    fn pack_png(&self) -> Vec<u8> {
        let samples = self.pack_simple();
        if samples.is_empty() {
            return samples;
        }

        let mut image = Vec::new();
        let mut encoder = png::Encoder::new(&mut image, (samples.len() / 2) as u32, 1);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Sixteen);
        let mut writer = encoder.write_header().expect("failed to write PNG header");
        writer
            .write_image_data(&samples)
            .expect("failed to write PNG samples");
        writer.finish().expect("failed to finish PNG");
        image
    }
}

/// Concatenate messages into one GRIB2 file image.
pub fn concat_messages<'a>(builders: impl IntoIterator<Item = &'a Grib2Builder>) -> Vec<u8> {
    let mut file = Vec::new();
    for builder in builders {
        file.extend_from_slice(&builder.build());
    }
    file
}

/// GRIB2 signed integers use the top bit as a sign flag.
fn sign_magnitude(value: i32) -> u32 {
    if value < 0 {
        0x8000_0000 | value.unsigned_abs()
    } else {
        value as u32
    }
}

fn sign_magnitude_i16(value: i16) -> u16 {
    if value < 0 {
        0x8000 | value.unsigned_abs()
    } else {
        value as u16
    }
}

fn sign_magnitude_i8(value: i8) -> u8 {
    if value < 0 {
        0x80 | value.unsigned_abs()
    } else {
        value as u8
    }
}
