use fractalforge_core::{Color, ComplexNumber, Palette, PaletteElement, PaletteMapping, Trap};

// ============================================================================
// Trap containment
// ============================================================================

#[test]
fn unit_square_trap_classifies_points() {
    let mut trap = Trap::new("square", ComplexNumber::ZERO);
    trap.move_to(-0.5, -0.5)
        .line_to(0.5, -0.5)
        .line_to(0.5, 0.5)
        .line_to(-0.5, 0.5)
        .close();

    assert!(trap.is_closed());
    assert!(trap.contains(ComplexNumber::ZERO), "origin is inside");
    assert!(
        !trap.contains(ComplexNumber::new(2.0, 2.0)),
        "(2,2) is outside"
    );
}

#[test]
fn curved_trap_contains_its_interior() {
    let mut trap = Trap::new("lens", ComplexNumber::ZERO);
    trap.move_to(-1.0, 0.0)
        .quad_to(ComplexNumber::new(0.0, 2.0), ComplexNumber::new(1.0, 0.0))
        .quad_to(ComplexNumber::new(0.0, -2.0), ComplexNumber::new(-1.0, 0.0))
        .close();

    assert!(trap.contains(ComplexNumber::new(0.0, 0.5)));
    assert!(!trap.contains(ComplexNumber::new(0.0, 1.5)));
}

// ============================================================================
// Palette interpolation and blending
// ============================================================================

#[test]
fn black_to_white_palette_is_mid_gray_at_half() {
    for steps in [2u32, 17, 100, 256] {
        let palette = Palette::build(vec![PaletteElement::new(
            Color::BLACK,
            Color::WHITE,
            steps,
            PaletteMapping::Linear,
        )]);
        let argb = palette.color_at(0.5).to_argb();
        for shift in [0, 8, 16] {
            let channel = ((argb >> shift) & 0xff) as i32;
            assert!(
                (channel - 128).abs() <= 1,
                "{} steps: channel {} is {}",
                steps,
                shift,
                channel
            );
        }
    }
}

#[test]
fn opaque_blue_over_red_at_half_opacity_is_even_mix() {
    let mut color = Color::from_argb(0xffff0000);
    color.blend(&Color::from_argb(0xff0000ff), 0.5);

    let expected = [1.0f32, 0.5, 0.0, 0.5];
    for (channel, want) in color.0.iter().zip(expected.iter()) {
        assert!((channel - want).abs() < 1e-6, "{:?}", color);
    }
}
