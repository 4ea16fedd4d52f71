//! Common test fixtures for the ingestion tests.

/// Regular lat/lon grid used by the header tests.
pub mod grid {
    pub const FIRST_LAT: f64 = 47.5;
    pub const LAST_LAT: f64 = 55.5;
    pub const FIRST_LON: f64 = 5.0;
    pub const LAST_LON: f64 = 17.0;
    pub const INCREMENT: f64 = 0.02;

    /// Expected wgf4 header for the grid above.
    pub const EXPECTED_HEADER: [i32; 7] = [
        47_500_000, 55_500_000, 5_000_000, 17_000_000, 20_000, 20_000, 1,
    ];
}

/// Directory listing fixtures in the style of an Apache/nginx autoindex page.
pub mod index {
    /// Default projection marker for regular lat/lon files.
    pub const MARKER: &str = "regular-lat-lon";

    /// Builds an autoindex HTML page listing `names`, one anchor per line.
    pub fn listing(names: &[&str]) -> String {
        let mut html = String::from(
            "<html>\r\n<head><title>Index of /tot_prec/</title></head>\r\n<body>\r\n<h1>Index of /tot_prec/</h1><hr><pre><a href=\"../\">../</a>\n",
        );
        for name in names {
            html.push_str(&format!(
                "<a href=\"{name}\">{name}</a>                 01-May-2024 14:05              271733\n"
            ));
        }
        html.push_str("</pre><hr></body>\r\n</html>\r\n");
        html
    }

    /// File name of an ICON-D2 single-level accumulated precipitation file.
    pub fn entry_name(projection: &str, step: u32) -> String {
        format!(
            "icon-d2_germany_{}_single-level_2024050112_{:03}_2d_tot_prec.grib2.bz2",
            projection, step
        )
    }
}
